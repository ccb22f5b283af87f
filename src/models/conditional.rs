//! # Conditional SIREN
//!
//! A SIREN whose input is the concatenation of coordinates `x` and a latent
//! code `z`, with an optional sigmoid head for density-like outputs.

use super::{
    block_parameters, build_blocks, initialize, inner_block_specs, rng_from_seed, validate_layers,
    SineLayer, DEFAULT_W0,
};
use crate::nn::init::Initializer;
use crate::nn::{extend_prefixed, ConditionalModule, Linear, Module, Sigmoid};
use crate::tensor::{ops, Tensor, TensorData, TensorError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter;
use tracing::debug;

/// Constant of the SIREN initializer used by every [`ConditionalSiren`].
///
/// The conditional variant always uses biases and SIREN initialization with
/// this constant; its config deliberately has no fields for them.
pub const CONDITIONAL_C: TensorData = 6.0;

/// Architecture of a [`ConditionalSiren`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalSirenConfig {
    /// Widths including input and output, e.g. `[2 + latent, 256, 256, 1]`.
    /// `layers[0]` must equal the feature count of `x` plus that of `z`.
    pub layers: Vec<usize>,
    /// Append a sigmoid so outputs lie in `[0, 1]`. Values are strictly
    /// inside the interval unless the pre-activation saturates `f32`
    /// (above roughly 17 or below roughly -88).
    pub return_density: bool,
    pub w0_initial: TensorData,
    pub w0: TensorData,
    pub seed: Option<u64>,
}

impl ConditionalSirenConfig {
    pub fn new(layers: Vec<usize>, return_density: bool, w0_initial: TensorData) -> Self {
        ConditionalSirenConfig {
            layers,
            return_density,
            w0_initial,
            w0: DEFAULT_W0,
            seed: None,
        }
    }

    pub fn with_w0(mut self, w0: TensorData) -> Self {
        self.w0 = w0;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug)]
pub struct ConditionalSiren {
    config: ConditionalSirenConfig,
    blocks: Vec<SineLayer>,
    output: Linear,
    density: Option<Sigmoid>,
}

impl ConditionalSiren {
    pub fn new(config: ConditionalSirenConfig) -> Result<Self, TensorError> {
        let mut rng = rng_from_seed(config.seed);
        Self::with_rng(config, &mut rng)
    }

    pub fn with_rng<R: Rng + ?Sized>(
        config: ConditionalSirenConfig,
        rng: &mut R,
    ) -> Result<Self, TensorError> {
        validate_layers(&config.layers, 3)?;
        let layers = &config.layers;
        let n = layers.len();

        let specs = inner_block_specs(layers, config.w0_initial, config.w0);
        let blocks = build_blocks(&specs, true, rng);
        let output = Linear::with_rng(layers[n - 2], layers[n - 1], true, rng);
        let density = config.return_density.then(Sigmoid::new);

        initialize(
            blocks.iter().map(|block| &block.linear).chain(iter::once(&output)),
            Initializer::Siren,
            CONDITIONAL_C,
            rng,
        )?;

        debug!(
            layers = ?config.layers,
            return_density = config.return_density,
            "Built conditional SIREN"
        );
        Ok(ConditionalSiren {
            config,
            blocks,
            output,
            density,
        })
    }

    pub fn config(&self) -> &ConditionalSirenConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[SineLayer] {
        &self.blocks
    }

    pub fn output_layer(&self) -> &Linear {
        &self.output
    }

    pub fn linear_layers(&self) -> impl Iterator<Item = &Linear> {
        self.blocks
            .iter()
            .map(|block| &block.linear)
            .chain(iter::once(&self.output))
    }
}

impl ConditionalModule for ConditionalSiren {
    /// Concatenates `x` and `z` along the last axis and runs the stack.
    fn forward(&self, x: &Tensor, z: &Tensor) -> Result<Tensor, TensorError> {
        let axis = ops::last_axis(x)?;
        let mut hidden = ops::cat(&[x.clone(), z.clone()], axis)?;
        for block in &self.blocks {
            hidden = block.forward(&hidden)?;
        }
        let output = self.output.forward(&hidden)?;
        match &self.density {
            Some(sigmoid) => sigmoid.forward(&output),
            None => Ok(output),
        }
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        let mut params = block_parameters(&self.blocks);
        extend_prefixed(&mut params, "output", self.output.parameters());
        params
    }
}
