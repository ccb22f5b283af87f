//! # Linear Layer Module

use crate::nn::functional as F;
use crate::nn::init::uniform_with_rng;
use crate::nn::Module;
use crate::tensor::{zeros, Tensor, TensorData, TensorError};
use rand::Rng;
use std::collections::BTreeMap;

/// Applies a linear transformation to the incoming data: `y = xA^T + b`.
///
/// Input shape: `(*, in_features)` where `*` means any number of additional dimensions.
/// Output shape: `(*, out_features)`
#[derive(Debug)]
pub struct Linear {
    pub weight: Tensor,       // Shape: (out_features, in_features)
    pub bias: Option<Tensor>, // Shape: (out_features)

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Creates a new Linear module.
    ///
    /// Weight and bias are drawn from `U(-k, k)` with `k = 1/sqrt(in_features)`
    /// (PyTorch's default).
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self::with_rng(in_features, out_features, bias, &mut rand::thread_rng())
    }

    /// Same as [`Linear::new`], drawing the initial values from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rng: &mut R,
    ) -> Self {
        let k = if in_features > 0 {
            1.0 / (in_features as TensorData).sqrt()
        } else {
            0.0
        };

        let weight = zeros(&[out_features, in_features], true);
        uniform_with_rng(&weight, -k, k, rng);

        let bias = bias.then(|| {
            let bias = zeros(&[out_features], true);
            uniform_with_rng(&bias, -k, k, &mut *rng);
            bias
        });

        Linear {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    /// Performs the forward pass: `input @ weight.T + bias` over the last axis.
    fn forward(&self, input: &Tensor) -> Result<Tensor, TensorError> {
        F::linear(input, &self.weight, self.bias.as_ref())
    }

    fn parameters(&self) -> BTreeMap<String, Tensor> {
        let mut params = BTreeMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        if let Some(ref bias) = self.bias {
            params.insert("bias".to_string(), bias.clone());
        }
        params
    }
}
