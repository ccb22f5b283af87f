//! # SIREN Models
//!
//! Sinusoidal representation networks from [Implicit Neural Representations
//! with Periodic Activation Functions](https://arxiv.org/abs/2006.09661):
//! stacks of `Linear` layers each followed by a [`Sine`] activation, with a
//! distinct frequency `w0_initial` on the first layer.
//!
//! Three variants share the stacking logic in this module:
//! - [`Siren`]: plain `in_features -> layers -> out_features` network.
//! - [`ConditionalSiren`]: input and latent code concatenated before the first layer.
//! - [`LatentModulatedSiren`]: per-layer additive shifts computed from a latent
//!   code ([From data to functa](https://arxiv.org/abs/2201.12204)).

use crate::nn::init::{siren_uniform_with_rng, FanMode, Initializer};
use crate::nn::{extend_prefixed, Linear, Module, Sine};
use crate::tensor::{Tensor, TensorData, TensorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub mod conditional;
pub mod modulated;
pub mod siren;

pub use conditional::{ConditionalSiren, ConditionalSirenConfig};
pub use modulated::{LatentModulatedSiren, LatentModulatedSirenConfig};
pub use siren::{Siren, SirenConfig};

/// Frequency of every sine after the first.
pub const DEFAULT_W0: TensorData = 1.0;
/// Frequency of the first sine, as used in the SIREN paper.
pub const DEFAULT_W0_INITIAL: TensorData = 30.0;
/// Constant `c` of the SIREN initializer, `bound = sqrt(c / fan_in)`.
pub const DEFAULT_C: TensorData = 6.0;

/// One hidden block: a linear layer followed by its sine activation.
#[derive(Debug)]
pub struct SineLayer {
    pub linear: Linear,
    pub activation: Sine,
}

impl SineLayer {
    fn with_rng<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        w0: TensorData,
        bias: bool,
        rng: &mut R,
    ) -> Self {
        SineLayer {
            linear: Linear::with_rng(in_features, out_features, bias, rng),
            activation: Sine::new(w0),
        }
    }
}

impl Module for SineLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError> {
        self.activation.forward(&self.linear.forward(input)?)
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        self.linear.parameters()
    }
}

/// Shape of one hidden block: `(in_features, out_features, w0)`.
type BlockSpec = (usize, usize, TensorData);

fn build_blocks<R: Rng + ?Sized>(specs: &[BlockSpec], bias: bool, rng: &mut R) -> Vec<SineLayer> {
    specs
        .iter()
        .map(|&(in_features, out_features, w0)| {
            SineLayer::with_rng(in_features, out_features, w0, bias, &mut *rng)
        })
        .collect()
}

/// Block specs for layer lists that include the input and output widths:
/// `layers[0] -> layers[1]` with `w0_initial`, then `w0` up to `layers[len - 2]`.
/// The final `layers[len - 2] -> layers[len - 1]` layer is not a block.
fn inner_block_specs(layers: &[usize], w0_initial: TensorData, w0: TensorData) -> Vec<BlockSpec> {
    let mut specs = vec![(layers[0], layers[1], w0_initial)];
    specs.extend(
        layers[1..layers.len() - 1]
            .windows(2)
            .map(|pair| (pair[0], pair[1], w0)),
    );
    specs
}

/// Applies `initializer` to the weight of every linear layer in `linears`.
fn initialize<'a, R, I>(
    linears: I,
    initializer: Initializer,
    c: TensorData,
    rng: &mut R,
) -> Result<(), TensorError>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a Linear>,
{
    match initializer {
        Initializer::Siren => linears
            .into_iter()
            .try_for_each(|linear| siren_uniform_with_rng(&linear.weight, FanMode::FanIn, c, &mut *rng)),
        Initializer::Default => Ok(()),
    }
}

fn validate_layers(layers: &[usize], min_len: usize) -> Result<(), TensorError> {
    if layers.is_empty() {
        return Err(TensorError::InvalidConfig(
            "layers should not be empty".to_string(),
        ));
    }
    if layers.len() < min_len {
        return Err(TensorError::InvalidConfig(format!(
            "layers should list at least {min_len} widths (input, hidden..., output), got {layers:?}"
        )));
    }
    if let Some(index) = layers.iter().position(|&width| width == 0) {
        return Err(TensorError::InvalidConfig(format!(
            "layer widths must be positive, layers[{index}] is 0"
        )));
    }
    Ok(())
}

fn validate_positive(value: usize, name: &str) -> Result<(), TensorError> {
    if value == 0 {
        return Err(TensorError::InvalidConfig(format!("{name} must be positive")));
    }
    Ok(())
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn block_parameters(blocks: &[SineLayer]) -> BTreeMap<String, Tensor> {
    let mut params = BTreeMap::new();
    for (i, block) in blocks.iter().enumerate() {
        extend_prefixed(&mut params, &format!("layers.{}", i), block.parameters());
    }
    params
}
