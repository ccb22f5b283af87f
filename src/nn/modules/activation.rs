//! # Activation Function Modules

use crate::nn::functional as F;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorData, TensorError};
use std::collections::BTreeMap;

/// Sine activation with frequency scaling: `Sine(x) = sin(w0 * x)`.
///
/// `w0` is fixed at construction. Shape is preserved and the op is fully
/// differentiable (`d/dx = w0 * cos(w0 * x)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sine {
    w0: TensorData,
}

impl Sine {
    /// Creates a new Sine module.
    pub fn new(w0: TensorData) -> Self {
        Sine { w0 }
    }

    pub fn w0(&self) -> TensorData {
        self.w0
    }
}

impl Default for Sine {
    fn default() -> Self {
        Sine::new(1.0)
    }
}

impl Module for Sine {
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError> {
        F::sine(input, self.w0)
    }

    /// Sine has no parameters.
    fn parameters(&self) -> BTreeMap<String, Tensor> {
        BTreeMap::new()
    }
}

/// Applies the Sigmoid function element-wise.
/// `Sigmoid(x) = 1 / (1 + exp(-x))`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid
    }
}

impl Module for Sigmoid {
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError> {
        F::sigmoid(input)
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        BTreeMap::new()
    }
}
