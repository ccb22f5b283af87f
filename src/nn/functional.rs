//! # Functional Interface (`nn::functional`)
//!
//! Stateless functions mirroring the layer modules, analogous to
//! `torch.nn.functional`. Modules delegate here.

use crate::tensor::{ops, Tensor, TensorData, TensorError};

/// Applies the sine activation `sin(w0 * x)` element-wise.
pub fn sine(input: &Tensor, w0: TensorData) -> Result<Tensor, TensorError> {
    ops::sin(&ops::mul_scalar(input, w0)?)
}

/// Applies the Sigmoid function element-wise.
pub fn sigmoid(input: &Tensor) -> Result<Tensor, TensorError> {
    ops::sigmoid(input)
}

/// Applies an affine map `input @ weight^T + bias`.
///
/// `input` has shape `[..., in_features]`, `weight` `[out_features, in_features]`
/// and `bias` `[out_features]`; the result has shape `[..., out_features]`.
pub fn linear(input: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor, TensorError> {
    let weight_t = ops::transpose(weight, 0, 1)?;
    let output = ops::matmul(input, &weight_t)?;
    match bias {
        Some(bias) => ops::add(&output, bias),
        None => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linear_matches_hand_computation() {
        let x = Tensor::from_vec(vec![1.0, 2.0], &[1, 2], false).unwrap();
        let w = Tensor::from_vec(vec![1.0, 0.0, 0.5, -1.0, 2.0, 3.0], &[3, 2], false).unwrap();
        let b = Tensor::from_vec(vec![0.0, 1.0, -1.0], &[3], false).unwrap();
        let y = linear(&x, &w, Some(&b)).unwrap();
        assert_eq!(y.to_vec(), vec![1.0, -0.5, 7.0]);
        assert_eq!(linear(&x, &w, None).unwrap().to_vec(), vec![1.0, -1.5, 8.0]);
    }

    #[test]
    fn sine_scales_before_sin() {
        let x = Tensor::from_vec(vec![std::f32::consts::FRAC_PI_4], &[1], false).unwrap();
        assert_abs_diff_eq!(sine(&x, 2.0).unwrap().item().unwrap(), 1.0, epsilon = 1e-6);
    }
}
