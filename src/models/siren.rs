//! # SIREN

use super::{
    block_parameters, build_blocks, initialize, rng_from_seed, validate_layers, validate_positive,
    SineLayer, DEFAULT_C, DEFAULT_W0,
};
use crate::nn::init::Initializer;
use crate::nn::{extend_prefixed, Linear, Module};
use crate::tensor::{Tensor, TensorData, TensorError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter;
use tracing::debug;

/// Architecture of a [`Siren`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SirenConfig {
    /// Hidden-layer widths; at least one.
    pub layers: Vec<usize>,
    pub in_features: usize,
    pub out_features: usize,
    /// `w0` of the first sine.
    pub w0_initial: TensorData,
    /// `w0` of every later sine.
    pub w0: TensorData,
    pub bias: bool,
    pub initializer: Initializer,
    /// Constant of the SIREN initializer.
    pub c: TensorData,
    /// Seed for weight initialization; fresh entropy when `None`.
    pub seed: Option<u64>,
}

impl SirenConfig {
    /// Config with `w0 = 1`, bias, SIREN initialization and `c = 6`.
    pub fn new(
        layers: Vec<usize>,
        in_features: usize,
        out_features: usize,
        w0_initial: TensorData,
    ) -> Self {
        SirenConfig {
            layers,
            in_features,
            out_features,
            w0_initial,
            w0: DEFAULT_W0,
            bias: true,
            initializer: Initializer::Siren,
            c: DEFAULT_C,
            seed: None,
        }
    }

    pub fn with_w0(mut self, w0: TensorData) -> Self {
        self.w0 = w0;
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

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// SIREN model from the paper [Implicit Neural Representations with
/// Periodic Activation Functions](https://arxiv.org/abs/2006.09661).
///
/// `in_features -> layers[0]` with `sin(w0_initial * .)`, then
/// `layers[i] -> layers[i + 1]` with `sin(w0 * .)`, then a plain linear
/// `layers[-1] -> out_features`.
#[derive(Debug)]
pub struct Siren {
    config: SirenConfig,
    blocks: Vec<SineLayer>,
    output: Linear,
}

impl Siren {
    /// Builds the network, seeding initialization from `config.seed`.
    pub fn new(config: SirenConfig) -> Result<Self, TensorError> {
        let mut rng = rng_from_seed(config.seed);
        Self::with_rng(config, &mut rng)
    }

    /// Builds the network drawing initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(config: SirenConfig, rng: &mut R) -> Result<Self, TensorError> {
        validate_layers(&config.layers, 1)?;
        validate_positive(config.in_features, "in_features")?;
        validate_positive(config.out_features, "out_features")?;

        let mut specs = vec![(config.in_features, config.layers[0], config.w0_initial)];
        specs.extend(config.layers.windows(2).map(|pair| (pair[0], pair[1], config.w0)));
        let blocks = build_blocks(&specs, config.bias, rng);

        let last_width = config.layers[config.layers.len() - 1];
        let output = Linear::with_rng(last_width, config.out_features, config.bias, rng);

        initialize(
            blocks.iter().map(|block| &block.linear).chain(iter::once(&output)),
            config.initializer,
            config.c,
            rng,
        )?;

        debug!(
            layers = ?config.layers,
            in_features = config.in_features,
            out_features = config.out_features,
            initializer = %config.initializer,
            "Built SIREN"
        );
        Ok(Siren {
            config,
            blocks,
            output,
        })
    }

    pub fn config(&self) -> &SirenConfig {
        &self.config
    }

    /// The linear+sine blocks, in forward order.
    pub fn blocks(&self) -> &[SineLayer] {
        &self.blocks
    }

    /// The final linear layer (no activation).
    pub fn output_layer(&self) -> &Linear {
        &self.output
    }

    /// Every linear layer, in forward order.
    pub fn linear_layers(&self) -> impl Iterator<Item = &Linear> {
        self.blocks
            .iter()
            .map(|block| &block.linear)
            .chain(iter::once(&self.output))
    }
}

impl Module for Siren {
    /// `[..., in_features]` -> `[..., out_features]`.
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError> {
        let mut hidden = input.clone();
        for block in &self.blocks {
            hidden = block.forward(&hidden)?;
        }
        self.output.forward(&hidden)
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        let mut params = block_parameters(&self.blocks);
        extend_prefixed(&mut params, "output", self.output.parameters());
        params
    }
}
