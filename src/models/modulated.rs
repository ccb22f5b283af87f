//! # Latent-Modulated SIREN
//!
//! A shared SIREN whose hidden pre-activations are shifted per feature by a
//! linear projection of a latent code ("shift modulation", as in
//! [From data to functa](https://arxiv.org/abs/2201.12204)).

use super::{
    block_parameters, build_blocks, initialize, inner_block_specs, rng_from_seed, validate_layers,
    validate_positive, SineLayer, DEFAULT_C, DEFAULT_W0, DEFAULT_W0_INITIAL,
};
use crate::nn::init::Initializer;
use crate::nn::{extend_prefixed, ConditionalModule, Linear, Module};
use crate::tensor::{ops, Tensor, TensorData, TensorError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter;
use tracing::debug;

/// Architecture of a [`LatentModulatedSiren`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentModulatedSirenConfig {
    /// Widths including input and output, e.g. `[2, 256, 256, 256, 1]` is
    /// 2 inputs, 1 output and 3 hidden layers of 256.
    pub layers: Vec<usize>,
    pub w0: TensorData,
    pub w0_initial: TensorData,
    pub bias: bool,
    /// Initializer of the main stack; the modulation layer keeps the default.
    pub initializer: Initializer,
    pub c: TensorData,
    pub latent_dim: usize,
    pub seed: Option<u64>,
}

impl LatentModulatedSirenConfig {
    /// Config with `w0 = 1`, `w0_initial = 30`, bias, SIREN initialization,
    /// `c = 6` and `latent_dim = 1`.
    pub fn new(layers: Vec<usize>) -> Self {
        LatentModulatedSirenConfig {
            layers,
            w0: DEFAULT_W0,
            w0_initial: DEFAULT_W0_INITIAL,
            bias: true,
            initializer: Initializer::Siren,
            c: DEFAULT_C,
            latent_dim: 1,
            seed: None,
        }
    }

    pub fn with_w0(mut self, w0: TensorData) -> Self {
        self.w0 = w0;
        self
    }

    pub fn with_w0_initial(mut self, w0_initial: TensorData) -> Self {
        self.w0_initial = w0_initial;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_c(mut self, c: TensorData) -> Self {
        self.c = c;
        self
    }

    pub fn with_latent_dim(mut self, latent_dim: usize) -> Self {
        self.latent_dim = latent_dim;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug)]
pub struct LatentModulatedSiren {
    config: LatentModulatedSirenConfig,
    mod_layer: Linear,
    blocks: Vec<SineLayer>,
    output: Linear,
}

impl LatentModulatedSiren {
    pub fn new(config: LatentModulatedSirenConfig) -> Result<Self, TensorError> {
        let mut rng = rng_from_seed(config.seed);
        Self::with_rng(config, &mut rng)
    }

    pub fn with_rng<R: Rng + ?Sized>(
        config: LatentModulatedSirenConfig,
        rng: &mut R,
    ) -> Result<Self, TensorError> {
        validate_layers(&config.layers, 3)?;
        validate_positive(config.latent_dim, "latent_dim")?;
        let layers = &config.layers;
        let n = layers.len();

        // One shift per hidden feature.
        let modulation_width: usize = layers[1..n - 1].iter().sum();
        let mod_layer = Linear::with_rng(config.latent_dim, modulation_width, true, rng);

        let specs = inner_block_specs(layers, config.w0_initial, config.w0);
        let blocks = build_blocks(&specs, config.bias, rng);
        let output = Linear::with_rng(layers[n - 2], layers[n - 1], config.bias, rng);

        initialize(
            blocks.iter().map(|block| &block.linear).chain(iter::once(&output)),
            config.initializer,
            config.c,
            rng,
        )?;

        debug!(
            layers = ?config.layers,
            latent_dim = config.latent_dim,
            modulation_width,
            "Built latent-modulated SIREN"
        );
        Ok(LatentModulatedSiren {
            config,
            mod_layer,
            blocks,
            output,
        })
    }

    pub fn config(&self) -> &LatentModulatedSirenConfig {
        &self.config
    }

    /// The latent -> shifts projection.
    pub fn modulation_layer(&self) -> &Linear {
        &self.mod_layer
    }

    /// Number of shifts produced per latent, `sum(layers[1..len - 1])`.
    pub fn modulation_width(&self) -> usize {
        self.mod_layer.out_features()
    }

    pub fn blocks(&self) -> &[SineLayer] {
        &self.blocks
    }

    pub fn output_layer(&self) -> &Linear {
        &self.output
    }

    /// Linear layers of the main stack, in forward order.
    pub fn linear_layers(&self) -> impl Iterator<Item = &Linear> {
        self.blocks
            .iter()
            .map(|block| &block.linear)
            .chain(iter::once(&self.output))
    }
}

impl ConditionalModule for LatentModulatedSiren {
    /// `x: [..., layers[0]]`, `z: [..., latent_dim]` -> `[..., layers[-1]]`.
    ///
    /// Block `i` computes `sin(w0_i * (linear_i(h) + shift_i))`, where the
    /// shifts are consecutive slices of `mod_layer(z)`.
    fn forward(&self, x: &Tensor, z: &Tensor) -> Result<Tensor, TensorError> {
        let modulation = self.mod_layer.forward(z)?;
        let axis = ops::last_axis(&modulation)?;

        let mut hidden = x.clone();
        let mut offset = 0;
        for block in &self.blocks {
            let width = block.linear.out_features();
            let shift = ops::narrow(&modulation, axis, offset, width)?;
            let shifted = (&block.linear.forward(&hidden)? + &shift)?;
            hidden = block.activation.forward(&shifted)?;
            offset += width;
        }
        self.output.forward(&hidden)
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        let mut params = block_parameters(&self.blocks);
        extend_prefixed(&mut params, "output", self.output.parameters());
        extend_prefixed(&mut params, "mod_layer", self.mod_layer.parameters());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{ops, zeros};

    fn model(layers: Vec<usize>, latent_dim: usize) -> LatentModulatedSiren {
        LatentModulatedSiren::new(
            LatentModulatedSirenConfig::new(layers)
                .with_latent_dim(latent_dim)
                .with_seed(3),
        )
        .unwrap()
    }

    #[test]
    fn modulation_covers_hidden_widths() {
        let m = model(vec![2, 32, 16, 1], 8);
        assert_eq!(m.modulation_width(), 48);
        assert_eq!(m.modulation_layer().weight.shape(), &[48, 8]);
        assert!(m.modulation_layer().bias.is_some());
        let w0s: Vec<TensorData> = m.blocks().iter().map(|b| b.activation.w0()).collect();
        assert_eq!(w0s, vec![30.0, 1.0]);
    }

    #[test]
    fn zero_modulation_reduces_to_plain_stack() {
        let m = model(vec![2, 8, 8, 1], 4);
        // Zero the projection so every shift is 0.
        for param in m.modulation_layer().parameters().values() {
            param.data_mut().fill(0.0);
        }
        let x = Tensor::from_vec(vec![0.1, -0.4, 0.3, 0.9], &[2, 2], false).unwrap();
        let z = Tensor::from_vec(vec![1.0; 8], &[2, 4], false).unwrap();

        let mut expected = x.clone();
        for block in m.blocks() {
            expected = block.forward(&expected).unwrap();
        }
        let expected = m.output_layer().forward(&expected).unwrap();
        assert_eq!(m.forward(&x, &z).unwrap().to_vec(), expected.to_vec());
    }

    #[test]
    fn hidden_blocks_take_consecutive_modulation_slices() {
        use crate::nn::functional as F;
        use approx::assert_abs_diff_eq;

        let m = model(vec![2, 3, 3, 1], 2);
        // With a zero weight, mod_layer(z) is exactly its bias.
        let shifts = [1.0, 2.0, 3.0, -4.0, -5.0, -6.0];
        m.modulation_layer().weight.data_mut().fill(0.0);
        let mod_bias = m.modulation_layer().bias.as_ref().unwrap();
        mod_bias
            .data_mut()
            .iter_mut()
            .zip(shifts)
            .for_each(|(v, s)| *v = s);

        let x = Tensor::from_vec(vec![0.25, -0.6], &[1, 2], false).unwrap();
        let z = Tensor::from_vec(vec![0.9, -0.3], &[1, 2], false).unwrap();

        let mut hidden = x.clone();
        for (block, slice) in m.blocks().iter().zip(shifts.chunks(3)) {
            let shift = Tensor::from_vec(slice.to_vec(), &[3], false).unwrap();
            let pre = ops::add(&block.linear.forward(&hidden).unwrap(), &shift).unwrap();
            hidden = F::sine(&pre, block.activation.w0()).unwrap();
        }
        let expected = m.output_layer().forward(&hidden).unwrap().to_vec();

        let got = m.forward(&x, &z).unwrap().to_vec();
        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(&expected) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn unbatched_latent_broadcasts_over_points() {
        let m = model(vec![2, 8, 1], 3);
        let out = m
            .forward(&zeros(&[5, 2], false), &zeros(&[3], false))
            .unwrap();
        assert_eq!(out.shape(), &[5, 1]);
    }

    #[test]
    fn gradients_reach_latent_and_modulation() {
        let m = model(vec![2, 8, 8, 1], 4);
        let x = Tensor::from_vec(vec![0.2, 0.5], &[1, 2], false).unwrap();
        let z = Tensor::from_vec(vec![0.1, 0.2, 0.3, 0.4], &[1, 4], true).unwrap();
        ops::sum(&m.forward(&x, &z).unwrap()).unwrap().backward().unwrap();

        assert!(z.grad().is_some());
        for (name, param) in m.parameters() {
            assert!(param.grad().is_some(), "no gradient for {name}");
        }
    }

    #[test]
    fn rejects_degenerate_configs() {
        assert!(LatentModulatedSiren::new(LatentModulatedSirenConfig::new(vec![2, 1])).is_err());
        assert!(LatentModulatedSiren::new(
            LatentModulatedSirenConfig::new(vec![2, 8, 1]).with_latent_dim(0)
        )
        .is_err());
    }
}
