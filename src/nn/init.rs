//! # Weight Initialization
//!
//! SIREN initialization from "Implicit Neural Representations with Periodic
//! Activation Functions" (Sitzmann, Martel et al., 2020): weights are drawn
//! from `U(-bound, bound)` with `bound = sqrt(c / fan)`.

use crate::tensor::{NoGradGuard, Tensor, TensorData, TensorError};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Which connection count the initialization bound is computed from.
///
/// `FanIn` preserves the magnitude of the variance of the weights in the
/// forward pass, `FanOut` in the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    #[default]
    FanIn,
    FanOut,
}

impl FromStr for FanMode {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan_in" => Ok(FanMode::FanIn),
            "fan_out" => Ok(FanMode::FanOut),
            other => Err(TensorError::InvalidConfig(format!(
                "mode {other:?} not supported, use one of \"fan_in\", \"fan_out\""
            ))),
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::FanIn => write!(f, "fan_in"),
            FanMode::FanOut => write!(f, "fan_out"),
        }
    }
}

/// Weight initializer applied to the linear layers of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initializer {
    /// [`siren_uniform_`] with `FanMode::FanIn` on every weight.
    #[default]
    Siren,
    /// Keep the `Linear` default, `U(-1/sqrt(in), 1/sqrt(in))`.
    Default,
}

impl FromStr for Initializer {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "siren" => Ok(Initializer::Siren),
            "default" => Ok(Initializer::Default),
            other => Err(TensorError::InvalidConfig(format!(
                "unknown initializer {other:?}, use one of \"siren\", \"default\""
            ))),
        }
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initializer::Siren => write!(f, "siren"),
            Initializer::Default => write!(f, "default"),
        }
    }
}

/// Computes fan-in or fan-out of a weight of shape `[fan_out, fan_in, *kernel]`.
///
/// Trailing dimensions form the receptive field and multiply both counts,
/// following the usual convention for convolution kernels.
pub fn calculate_fan(shape: &[usize], mode: FanMode) -> Result<usize, TensorError> {
    if shape.len() < 2 {
        return Err(TensorError::InvalidConfig(format!(
            "fan in and fan out can not be computed for tensor with fewer than 2 dimensions, got shape {shape:?}"
        )));
    }
    let receptive_field: usize = shape[2..].iter().product();
    Ok(match mode {
        FanMode::FanIn => shape[1] * receptive_field,
        FanMode::FanOut => shape[0] * receptive_field,
    })
}

/// Bound of the SIREN uniform distribution for a weight of `shape`.
pub fn siren_bound(shape: &[usize], mode: FanMode, c: TensorData) -> Result<TensorData, TensorError> {
    if !c.is_finite() || c < 0.0 {
        return Err(TensorError::InvalidConfig(format!(
            "siren constant c must be finite and non-negative, got {c}"
        )));
    }
    let fan = calculate_fan(shape, mode)?;
    if fan == 0 {
        return Err(TensorError::InvalidConfig(format!(
            "cannot initialize zero-element tensor of shape {shape:?}"
        )));
    }
    let std = 1.0 / (fan as TensorData).sqrt();
    Ok(c.sqrt() * std)
}

/// Fills `tensor` with values drawn from `U[-bound, bound]`,
/// `bound = sqrt(c) / sqrt(fan)`, using the thread-local RNG.
///
/// ```
/// use siren::nn::init::{siren_uniform_, FanMode};
/// use siren::tensor::zeros;
///
/// let w = zeros(&[3, 5], true);
/// siren_uniform_(&w, FanMode::FanIn, 6.0).unwrap();
/// ```
pub fn siren_uniform_(tensor: &Tensor, mode: FanMode, c: TensorData) -> Result<(), TensorError> {
    siren_uniform_with_rng(tensor, mode, c, &mut rand::thread_rng())
}

/// [`siren_uniform_`] with an explicit random source.
pub fn siren_uniform_with_rng<R: Rng + ?Sized>(
    tensor: &Tensor,
    mode: FanMode,
    c: TensorData,
    rng: &mut R,
) -> Result<(), TensorError> {
    let bound = siren_bound(tensor.shape(), mode, c)?;
    trace!(shape = ?tensor.shape(), %mode, c, bound, "siren_uniform_");
    uniform_with_rng(tensor, -bound, bound, rng);
    Ok(())
}

/// Overwrites every element with an independent draw from `U[low, high]`.
pub(crate) fn uniform_with_rng<R: Rng + ?Sized>(
    tensor: &Tensor,
    low: TensorData,
    high: TensorData,
    rng: &mut R,
) {
    let _guard = NoGradGuard::new();
    let mut data = tensor.data_mut();
    if low == high {
        data.fill(low);
        return;
    }
    let dist = Uniform::new_inclusive(low, high);
    data.map_inplace(|v| *v = dist.sample(&mut *rng));
}
