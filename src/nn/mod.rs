//! # Neural Network Module (`nn`)
//!
//! Provides building blocks for creating neural networks, similar to `torch.nn`.
//! Includes modules (layers), weight initialization and functional interfaces.

use crate::tensor::{Tensor, TensorError};
use std::collections::BTreeMap;
use std::fmt::Debug;

// --- Submodules ---
pub mod functional;
pub mod init;
pub mod modules;

// Re-export common items
pub use init::{siren_uniform_, FanMode, Initializer};
pub use modules::*;

// --- Core Traits ---

/// Base trait for single-input neural network modules (layers, networks).
/// Needs `Debug` for printing/inspection, `Send + Sync` so modules can be
/// shared with the rayon pool.
pub trait Module: Debug + Send + Sync {
    /// Performs the forward pass of the module.
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError>;

    /// Returns the module's parameters (tensors that require gradients).
    /// The key is a dotted path (e.g. "layers.0.weight").
    /// Uses BTreeMap for deterministic order.
    fn parameters(&self) -> BTreeMap<String, Tensor>;

    /// Zeros the gradients of all parameters within the module.
    fn zero_grad(&self) {
        for param in self.parameters().values() {
            param.zero_grad();
        }
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().values().map(Tensor::size).sum()
    }
}

/// Modules whose forward pass takes an input `x` together with a
/// conditioning (latent) tensor `z`.
pub trait ConditionalModule: Debug + Send + Sync {
    fn forward(&self, x: &Tensor, z: &Tensor) -> Result<Tensor, TensorError>;

    fn parameters(&self) -> BTreeMap<String, Tensor>;

    fn zero_grad(&self) {
        for param in self.parameters().values() {
            param.zero_grad();
        }
    }

    fn num_parameters(&self) -> usize {
        self.parameters().values().map(Tensor::size).sum()
    }
}

/// Inserts `params` into `into` under `prefix.name`.
pub(crate) fn extend_prefixed(
    into: &mut BTreeMap<String, Tensor>,
    prefix: &str,
    params: BTreeMap<String, Tensor>,
) {
    for (name, param) in params {
        into.insert(format!("{}.{}", prefix, name), param);
    }
}
