//! # Configuration Serialization Utilities
//!
//! Model architectures are described by serde-serializable configs
//! (`SirenConfig` and friends). These helpers encode them with `bincode`, so
//! an architecture can be stored next to an experiment and rebuilt later.
//! Weights are not serialized.

use crate::tensor::TensorError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Encodes a configuration into bytes.
pub fn encode_config<T: Serialize>(config: &T) -> Result<Vec<u8>, TensorError> {
    Ok(bincode::serialize(config)?)
}

/// Decodes a configuration previously produced by [`encode_config`].
pub fn decode_config<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TensorError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Writes an encoded configuration to `writer`.
pub fn write_config<T: Serialize, W: Write>(config: &T, writer: W) -> Result<(), TensorError> {
    Ok(bincode::serialize_into(writer, config)?)
}

/// Reads a configuration written by [`write_config`].
pub fn read_config<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, TensorError> {
    Ok(bincode::deserialize_from(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatentModulatedSirenConfig, SirenConfig};
    use crate::nn::init::Initializer;

    #[test]
    fn siren_config_survives_encoding() {
        let config = SirenConfig::new(vec![16, 16], 2, 3, 30.0)
            .with_w0(2.0)
            .with_initializer(Initializer::Default)
            .with_seed(7);
        let bytes = encode_config(&config).unwrap();
        let decoded: SirenConfig = decode_config(&bytes).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn read_and_write_through_io() {
        let config = LatentModulatedSirenConfig::new(vec![2, 8, 1]).with_latent_dim(4);
        let mut buffer = Vec::new();
        write_config(&config, &mut buffer).unwrap();
        let decoded: LatentModulatedSirenConfig = read_config(buffer.as_slice()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn truncated_bytes_are_a_serialization_error() {
        let bytes = encode_config(&SirenConfig::new(vec![4], 1, 1, 30.0)).unwrap();
        let err = decode_config::<SirenConfig>(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, TensorError::Serialization(_)));
    }
}
