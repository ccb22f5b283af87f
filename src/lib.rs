//! # SIREN Library
//!
//! Sinusoidal representation networks (SIREN) for implicit neural
//! representations, built on a small CPU tensor core with reverse-mode
//! autograd.
//!
//! - [`tensor`]: `Tensor`, differentiable ops, autograd and `no_grad`.
//! - [`nn`]: the `Module` traits, `Linear`, `Sine`, `Sigmoid` and SIREN
//!   weight initialization.
//! - [`models`]: `Siren`, `ConditionalSiren` and `LatentModulatedSiren`.
//! - [`utils`]: rayon-backed parallel forward and config serialization.
//!
//! ```
//! use siren::prelude::*;
//!
//! let model = Siren::new(SirenConfig::new(vec![32, 32], 2, 1, 30.0).with_seed(0)).unwrap();
//! let coords = zeros(&[16, 2], false);
//! let values = model.forward(&coords).unwrap();
//! assert_eq!(values.shape(), &[16, 1]);
//! ```

pub mod models;
pub mod nn;
pub mod tensor;
pub mod utils;

pub mod prelude {
    pub use crate::models::{
        ConditionalSiren, ConditionalSirenConfig, LatentModulatedSiren, LatentModulatedSirenConfig,
        Siren, SirenConfig,
    };
    pub use crate::nn::init::{siren_uniform_, FanMode, Initializer};
    pub use crate::nn::{ConditionalModule, Linear, Module, Sigmoid, Sine};
    pub use crate::tensor::{no_grad, ones, zeros, Tensor, TensorData, TensorError};
}
