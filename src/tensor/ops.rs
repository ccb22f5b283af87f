//! # Tensor Operations
//!
//! Implements mathematical operations for Tensors, including autograd support.
//! Every op computes its result eagerly and, when grad mode is enabled and an
//! input requires grad, records a backward rule next to the result.

use super::autograd::{is_grad_enabled, AutogradContext, BackwardOp};
use super::{Tensor, TensorData, TensorError};
use crate::utils::parallel::map_elementwise;
use ndarray::{Array2, ArrayD, Axis, Ix2, IxDyn, Slice};
use std::sync::Arc;

// --- Helper Function for Autograd Setup ---

/// Creates a new tensor resulting from an operation, setting up autograd context if needed.
fn create_op_result(
    result_data: ArrayD<TensorData>,
    inputs: Vec<Tensor>,
    backward_op: Box<dyn BackwardOp>,
) -> Tensor {
    let requires_grad = is_grad_enabled() && inputs.iter().any(Tensor::requires_grad);
    if requires_grad {
        let grad_context = Arc::new(AutogradContext::new(inputs, backward_op));
        Tensor::from_op(result_data, grad_context)
    } else {
        Tensor::new(result_data, false)
    }
}

fn check_axis(tensor: &Tensor, axis: usize) -> Result<(), TensorError> {
    if axis >= tensor.ndim() {
        return Err(TensorError::AxisOutOfRange {
            axis,
            ndim: tensor.ndim(),
        });
    }
    Ok(())
}

/// Index of the trailing (feature) axis.
pub fn last_axis(tensor: &Tensor) -> Result<usize, TensorError> {
    tensor
        .ndim()
        .checked_sub(1)
        .ok_or(TensorError::AxisOutOfRange { axis: 0, ndim: 0 })
}

// --- Broadcasting ---

/// Checks if tensor shapes can be broadcast together following NumPy broadcasting rules
pub fn can_broadcast(shape1: &[usize], shape2: &[usize]) -> bool {
    shape1
        .iter()
        .rev()
        .zip(shape2.iter().rev())
        .all(|(&s1, &s2)| s1 == s2 || s1 == 1 || s2 == 1)
}

/// Computes the broadcast result shape of two shapes.
pub fn broadcast_shapes(shape1: &[usize], shape2: &[usize]) -> Result<Vec<usize>, TensorError> {
    if !can_broadcast(shape1, shape2) {
        return Err(TensorError::IncompatibleShapes {
            op: "broadcast".to_string(),
            shape1: shape1.to_vec(),
            shape2: shape2.to_vec(),
        });
    }
    let ndim = shape1.len().max(shape2.len());
    let dim_at = |shape: &[usize], i: usize| {
        // Right-aligned lookup; missing leading dims act as 1.
        let offset = ndim - shape.len();
        if i < offset {
            1
        } else {
            shape[i - offset]
        }
    };
    Ok((0..ndim)
        .map(|i| {
            let (d1, d2) = (dim_at(shape1, i), dim_at(shape2, i));
            if d1 == 1 {
                d2
            } else {
                d1
            }
        })
        .collect())
}

/// Sums a broadcast gradient back down to `shape`.
fn sum_to_shape(grad: &ArrayD<TensorData>, shape: &[usize]) -> ArrayD<TensorData> {
    let mut reduced = grad.clone();
    while reduced.ndim() > shape.len() {
        reduced = reduced.sum_axis(Axis(0));
    }
    for (axis, &dim) in shape.iter().enumerate() {
        if dim == 1 && reduced.shape()[axis] != 1 {
            reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }
    reduced
}

// --- Arithmetic Operations ---

/// Element-wise addition of two tensors with broadcasting.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    let out_shape = broadcast_shapes(a.shape(), b.shape()).map_err(|_| {
        TensorError::IncompatibleShapes {
            op: "add".to_string(),
            shape1: a.shape().to_vec(),
            shape2: b.shape().to_vec(),
        }
    })?;

    let result = {
        let a_data = a.data();
        let b_data = b.data();
        let incompatible = || TensorError::IncompatibleShapes {
            op: "add".to_string(),
            shape1: a.shape().to_vec(),
            shape2: b.shape().to_vec(),
        };
        let a_view = a_data.broadcast(IxDyn(&out_shape)).ok_or_else(incompatible)?;
        let b_view = b_data.broadcast(IxDyn(&out_shape)).ok_or_else(incompatible)?;
        &a_view + &b_view
    };

    Ok(create_op_result(
        result,
        vec![a.clone(), b.clone()],
        Box::new(AddBackward),
    ))
}

#[derive(Debug)]
struct AddBackward;

impl BackwardOp for AddBackward {
    fn backward(
        &self,
        inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        Ok(inputs
            .iter()
            .map(|input| sum_to_shape(output_grad, input.shape()))
            .collect())
    }
}

/// Multiplies every element by a scalar.
pub fn mul_scalar(a: &Tensor, scalar: TensorData) -> Result<Tensor, TensorError> {
    let result = map_elementwise(&a.data(), |x| x * scalar);
    Ok(create_op_result(
        result,
        vec![a.clone()],
        Box::new(MulScalarBackward { scalar }),
    ))
}

#[derive(Debug)]
struct MulScalarBackward {
    scalar: TensorData,
}

impl BackwardOp for MulScalarBackward {
    fn backward(
        &self,
        _inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        Ok(vec![output_grad * self.scalar])
    }
}

// --- Elementwise Nonlinearities ---

/// Element-wise sine.
pub fn sin(a: &Tensor) -> Result<Tensor, TensorError> {
    let result = map_elementwise(&a.data(), TensorData::sin);
    Ok(create_op_result(result, vec![a.clone()], Box::new(SinBackward)))
}

#[derive(Debug)]
struct SinBackward;

impl BackwardOp for SinBackward {
    fn backward(
        &self,
        inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        let mut grad = map_elementwise(&inputs[0].data(), TensorData::cos);
        grad *= output_grad;
        Ok(vec![grad])
    }
}

fn sigmoid_scalar(x: TensorData) -> TensorData {
    1.0 / (1.0 + (-x).exp())
}

/// Element-wise logistic sigmoid `1 / (1 + exp(-x))`.
///
/// In `f32` the result rounds to exactly `1.0` for `x` above roughly 17 and
/// to `0.0` below roughly -88.
pub fn sigmoid(a: &Tensor) -> Result<Tensor, TensorError> {
    let result = map_elementwise(&a.data(), sigmoid_scalar);
    Ok(create_op_result(result, vec![a.clone()], Box::new(SigmoidBackward)))
}

#[derive(Debug)]
struct SigmoidBackward;

impl BackwardOp for SigmoidBackward {
    fn backward(
        &self,
        inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        let mut grad = map_elementwise(&inputs[0].data(), |x| {
            let s = sigmoid_scalar(x);
            s * (1.0 - s)
        });
        grad *= output_grad;
        Ok(vec![grad])
    }
}

// --- Reductions ---

/// Sums all elements into a zero-dimensional tensor.
pub fn sum(a: &Tensor) -> Result<Tensor, TensorError> {
    let result = ndarray::arr0(a.data().sum()).into_dyn();
    Ok(create_op_result(
        result,
        vec![a.clone()],
        Box::new(SumBackward {
            input_shape: a.shape().to_vec(),
        }),
    ))
}

#[derive(Debug)]
struct SumBackward {
    input_shape: Vec<usize>,
}

impl BackwardOp for SumBackward {
    fn backward(
        &self,
        _inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        Ok(vec![ArrayD::from_elem(
            IxDyn(&self.input_shape),
            output_grad.sum(),
        )])
    }
}

// --- Linear Algebra ---

fn swap_axes(array: &ArrayD<TensorData>, dim0: usize, dim1: usize) -> ArrayD<TensorData> {
    let mut axes: Vec<usize> = (0..array.ndim()).collect();
    axes.swap(dim0, dim1);
    array
        .view()
        .permuted_axes(axes)
        .as_standard_layout()
        .into_owned()
}

/// Swaps two axes.
pub fn transpose(a: &Tensor, dim0: usize, dim1: usize) -> Result<Tensor, TensorError> {
    check_axis(a, dim0)?;
    check_axis(a, dim1)?;
    let result = swap_axes(&a.data(), dim0, dim1);
    Ok(create_op_result(
        result,
        vec![a.clone()],
        Box::new(TransposeBackward { dim0, dim1 }),
    ))
}

#[derive(Debug)]
struct TransposeBackward {
    dim0: usize,
    dim1: usize,
}

impl BackwardOp for TransposeBackward {
    fn backward(
        &self,
        _inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        // Gradient of transpose is transpose of gradient
        Ok(vec![swap_axes(output_grad, self.dim0, self.dim1)])
    }
}

/// Collapses all leading axes: `[..., k]` -> `[rows, k]`.
fn flatten_to_2d(array: &ArrayD<TensorData>) -> Result<Array2<TensorData>, TensorError> {
    let ndim = array.ndim();
    let cols = array.shape()[ndim - 1];
    let rows: usize = array.shape()[..ndim - 1].iter().product();
    Ok(Array2::from_shape_vec(
        (rows, cols),
        array.iter().copied().collect(),
    )?)
}

/// Matrix product of `a` (shape `[..., k]`) with a 2-D `b` (shape `[k, m]`),
/// giving `[..., m]`. Leading axes of `a` are treated as a batch.
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
    let incompatible = || TensorError::IncompatibleShapes {
        op: "matmul".to_string(),
        shape1: a.shape().to_vec(),
        shape2: b.shape().to_vec(),
    };
    if a.ndim() == 0 || b.ndim() != 2 || a.shape()[a.ndim() - 1] != b.shape()[0] {
        return Err(incompatible());
    }

    let mut out_shape = a.shape()[..a.ndim() - 1].to_vec();
    out_shape.push(b.shape()[1]);

    let result = {
        let a2 = flatten_to_2d(&a.data())?;
        let b_data = b.data();
        let b2 = b_data.view().into_dimensionality::<Ix2>()?;
        let product = a2.dot(&b2);
        ArrayD::from_shape_vec(IxDyn(&out_shape), product.iter().copied().collect())?
    };

    Ok(create_op_result(
        result,
        vec![a.clone(), b.clone()],
        Box::new(MatMulBackward),
    ))
}

#[derive(Debug)]
struct MatMulBackward;

impl BackwardOp for MatMulBackward {
    fn backward(
        &self,
        inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        let a_data = inputs[0].data();
        let b_data = inputs[1].data();

        let a2 = flatten_to_2d(&a_data)?;
        let g2 = flatten_to_2d(output_grad)?;
        let b2 = b_data.view().into_dimensionality::<Ix2>()?;

        // dA = dC @ B^T, dB = A^T @ dC
        let grad_a = g2.dot(&b2.t());
        let grad_b = a2.t().dot(&g2);

        Ok(vec![
            ArrayD::from_shape_vec(IxDyn(a_data.shape()), grad_a.iter().copied().collect())?,
            grad_b.into_dyn(),
        ])
    }
}

// --- Joining and Slicing ---

/// Concatenates tensors along `axis`. All other dimensions must match.
pub fn cat(tensors: &[Tensor], axis: usize) -> Result<Tensor, TensorError> {
    let first = tensors
        .first()
        .ok_or_else(|| TensorError::Generic("cat requires at least one tensor".to_string()))?;
    check_axis(first, axis)?;

    for other in &tensors[1..] {
        let compatible = other.ndim() == first.ndim()
            && first
                .shape()
                .iter()
                .zip(other.shape())
                .enumerate()
                .all(|(i, (d1, d2))| i == axis || d1 == d2);
        if !compatible {
            return Err(TensorError::IncompatibleShapes {
                op: "cat".to_string(),
                shape1: first.shape().to_vec(),
                shape2: other.shape().to_vec(),
            });
        }
    }

    let result = {
        let guards: Vec<_> = tensors.iter().map(Tensor::data).collect();
        let views: Vec<_> = guards.iter().map(|guard| guard.view()).collect();
        ndarray::concatenate(Axis(axis), &views)?
    };

    let sizes = tensors.iter().map(|t| t.shape()[axis]).collect();
    Ok(create_op_result(
        result,
        tensors.to_vec(),
        Box::new(CatBackward { axis, sizes }),
    ))
}

#[derive(Debug)]
struct CatBackward {
    axis: usize,
    sizes: Vec<usize>,
}

impl BackwardOp for CatBackward {
    fn backward(
        &self,
        _inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        let mut offset = 0;
        Ok(self
            .sizes
            .iter()
            .map(|&size| {
                let piece = output_grad
                    .slice_axis(Axis(self.axis), Slice::from(offset..offset + size))
                    .to_owned();
                offset += size;
                piece
            })
            .collect())
    }
}

/// Returns `len` consecutive entries of `axis` starting at `start`.
pub fn narrow(a: &Tensor, axis: usize, start: usize, len: usize) -> Result<Tensor, TensorError> {
    check_axis(a, axis)?;
    let end = match start.checked_add(len) {
        Some(end) if end <= a.shape()[axis] => end,
        _ => {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![start, len],
                shape: a.shape().to_vec(),
            })
        }
    };

    let result = a
        .data()
        .slice_axis(Axis(axis), Slice::from(start..end))
        .to_owned();
    Ok(create_op_result(
        result,
        vec![a.clone()],
        Box::new(NarrowBackward {
            axis,
            start,
            input_shape: a.shape().to_vec(),
        }),
    ))
}

#[derive(Debug)]
struct NarrowBackward {
    axis: usize,
    start: usize,
    input_shape: Vec<usize>,
}

impl BackwardOp for NarrowBackward {
    fn backward(
        &self,
        _inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError> {
        let mut grad = ArrayD::zeros(IxDyn(&self.input_shape));
        let len = output_grad.shape()[self.axis];
        grad.slice_axis_mut(Axis(self.axis), Slice::from(self.start..self.start + len))
            .assign(output_grad);
        Ok(vec![grad])
    }
}

/// Splits `a` into at most `chunks` pieces along `axis`, like `torch.chunk`.
/// Every piece but the last has `ceil(dim / chunks)` entries.
pub fn chunk(a: &Tensor, chunks: usize, axis: usize) -> Result<Vec<Tensor>, TensorError> {
    if chunks == 0 {
        return Err(TensorError::InvalidConfig(
            "chunk count must be positive".to_string(),
        ));
    }
    check_axis(a, axis)?;

    let dim = a.shape()[axis];
    if dim == 0 {
        return Ok(vec![a.clone()]);
    }
    let step = dim.div_ceil(chunks);
    (0..dim)
        .step_by(step)
        .map(|start| narrow(a, axis, start, step.min(dim - start)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tensor(data: Vec<TensorData>, shape: &[usize], requires_grad: bool) -> Tensor {
        Tensor::from_vec(data, shape, requires_grad).unwrap()
    }

    #[test]
    fn broadcast_shapes_follows_numpy_rules() {
        assert_eq!(broadcast_shapes(&[4, 3], &[3]).unwrap(), vec![4, 3]);
        assert_eq!(broadcast_shapes(&[2, 1, 5], &[4, 1]).unwrap(), vec![2, 4, 5]);
        assert!(broadcast_shapes(&[4, 3], &[2]).is_err());
    }

    #[test]
    fn broadcast_add_reduces_gradient_to_input_shape() {
        let x = tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], true);
        let bias = tensor(vec![10.0, 20.0, 30.0], &[3], true);
        let y = add(&x, &bias).unwrap();
        assert_eq!(y.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);

        sum(&y).unwrap().backward().unwrap();
        assert_eq!(x.grad().unwrap().to_vec(), vec![1.0; 6]);
        assert_eq!(bias.grad().unwrap().to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn add_rejects_incompatible_shapes() {
        let a = tensor(vec![0.0; 6], &[2, 3], false);
        let b = tensor(vec![0.0; 2], &[2], false);
        assert!(matches!(
            add(&a, &b),
            Err(TensorError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn matmul_batches_leading_axes() {
        // [2, 1, 2] @ [2, 3]
        let a = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 1, 2], false);
        let b = tensor(vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0], &[2, 3], false);
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 1, 3]);
        assert_eq!(c.to_vec(), vec![1.0, 2.0, 3.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn matmul_gradients_match_closed_form() {
        let a = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true);
        let b = tensor(vec![0.5, -1.0, 2.0, 0.0], &[2, 2], true);
        sum(&matmul(&a, &b).unwrap()).unwrap().backward().unwrap();

        // d(sum(AB))/dA = 1 @ B^T: row sums of B; d/dB = A^T @ 1: column sums of A
        assert_eq!(a.grad().unwrap().to_vec(), vec![-0.5, 2.0, -0.5, 2.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![4.0, 4.0, 6.0, 6.0]);
    }

    #[test]
    fn matmul_rejects_inner_dimension_mismatch() {
        let a = tensor(vec![0.0; 6], &[2, 3], false);
        let b = tensor(vec![0.0; 4], &[2, 2], false);
        assert!(matmul(&a, &b).is_err());
    }

    #[test]
    fn transpose_gradient_flows_back() {
        let w = tensor(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], true);
        let t = transpose(&w, 0, 1).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let x = tensor(vec![1.0, 1.0, 1.0], &[1, 3], false);
        sum(&matmul(&x, &t).unwrap()).unwrap().backward().unwrap();
        assert_eq!(w.grad().unwrap().to_vec(), vec![1.0; 6]);
    }

    #[test]
    fn sin_and_scale_gradient() {
        let x = tensor(vec![0.0, 0.5, -1.0], &[3], true);
        let y = sin(&mul_scalar(&x, 2.0).unwrap()).unwrap();
        sum(&y).unwrap().backward().unwrap();
        for (g, xv) in x.grad().unwrap().to_vec().iter().zip([0.0f32, 0.5, -1.0]) {
            assert_abs_diff_eq!(*g, 2.0 * (2.0 * xv).cos(), epsilon = 1e-6);
        }
    }

    #[test]
    fn sigmoid_values_and_gradient() {
        let x = tensor(vec![0.0, 2.0], &[2], true);
        let y = sigmoid(&x).unwrap();
        assert_abs_diff_eq!(y.to_vec()[0], 0.5, epsilon = 1e-7);
        sum(&y).unwrap().backward().unwrap();
        assert_abs_diff_eq!(x.grad().unwrap().to_vec()[0], 0.25, epsilon = 1e-7);
    }

    #[test]
    fn cat_and_narrow_route_gradients() {
        let x = tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true);
        let z = tensor(vec![5.0, 6.0], &[2, 1], true);
        let xz = cat(&[x.clone(), z.clone()], 1).unwrap();
        assert_eq!(xz.shape(), &[2, 3]);
        assert_eq!(xz.to_vec(), vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);

        // Only the last two columns contribute.
        let tail = narrow(&xz, 1, 1, 2).unwrap();
        assert_eq!(tail.to_vec(), vec![2.0, 5.0, 4.0, 6.0]);
        sum(&tail).unwrap().backward().unwrap();
        assert_eq!(x.grad().unwrap().to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(z.grad().unwrap().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn cat_rejects_mismatched_batch() {
        let x = tensor(vec![0.0; 4], &[2, 2], false);
        let z = tensor(vec![0.0; 3], &[3, 1], false);
        assert!(cat(&[x, z], 1).is_err());
        assert!(cat(&[], 0).is_err());
    }

    #[test]
    fn narrow_checks_bounds() {
        let x = tensor(vec![0.0; 4], &[4], false);
        assert!(matches!(
            narrow(&x, 0, 3, 2),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            narrow(&x, 1, 0, 1),
            Err(TensorError::AxisOutOfRange { .. })
        ));
        assert!(matches!(
            narrow(&x, usize::MAX, 2, 0),
            Err(TensorError::AxisOutOfRange { .. })
        ));
        assert!(matches!(
            narrow(&x, 0, usize::MAX, 2),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn sigmoid_saturates_at_large_magnitudes() {
        let x = tensor(vec![20.0, -100.0, 5.0], &[3], false);
        let y = sigmoid(&x).unwrap().to_vec();
        assert_eq!(y[0], 1.0);
        assert_eq!(y[1], 0.0);
        assert!(y[2] > 0.0 && y[2] < 1.0);
    }

    #[test]
    fn chunk_splits_like_torch() {
        let x = tensor((0..5).map(|v| v as TensorData).collect(), &[5, 1], false);
        let pieces = chunk(&x, 2, 0).unwrap();
        let sizes: Vec<usize> = pieces.iter().map(|p| p.shape()[0]).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(cat(&pieces, 0).unwrap().to_vec(), x.to_vec());
    }
}
