//! # Parallelism Utilities (CPU Threading)
//!
//! Data parallelism helpers built on `rayon`: elementwise kernels for large
//! tensors, and a batch-splitting forward pass that runs chunks of a batch on
//! the rayon pool and gathers the results in order.

use crate::nn::{ConditionalModule, Module};
use crate::tensor::{is_grad_enabled, ops, NoGradGuard, Tensor, TensorData, TensorError};
use ndarray::ArrayD;
use rayon::prelude::*;
use tracing::warn;

/// Element count from which elementwise kernels switch to rayon.
pub const PARALLEL_THRESHOLD: usize = 1 << 15;

/// Applies `f` to every element, in parallel for large arrays.
/// The result is always in standard (row-major) layout.
pub fn map_elementwise<F>(input: &ArrayD<TensorData>, f: F) -> ArrayD<TensorData>
where
    F: Fn(TensorData) -> TensorData + Send + Sync,
{
    if input.len() < PARALLEL_THRESHOLD {
        return input.mapv(f);
    }

    let mut output = input.as_standard_layout().into_owned();
    match output.as_slice_mut() {
        Some(values) => values.par_iter_mut().for_each(|v| *v = f(*v)),
        None => output.mapv_inplace(&f),
    }
    output
}

fn split_batch(input: &Tensor, chunks: usize) -> Result<Vec<Tensor>, TensorError> {
    if input.ndim() == 0 {
        return Err(TensorError::AxisOutOfRange { axis: 0, ndim: 0 });
    }
    let batch = input.shape()[0];
    if batch < chunks {
        warn!(batch, chunks, "Batch is smaller than the requested chunk count");
    }
    ops::chunk(input, chunks, 0)
}

/// Worker threads do not inherit the caller's thread-local grad mode.
fn guard_like_caller(grad_enabled: bool) -> Option<NoGradGuard> {
    (!grad_enabled).then(NoGradGuard::new)
}

/// Runs `module.forward` over `chunks` slices of the batch axis (axis 0) in
/// parallel and concatenates the outputs. Equivalent to `module.forward(input)`.
pub fn parallel_forward<M>(module: &M, input: &Tensor, chunks: usize) -> Result<Tensor, TensorError>
where
    M: Module + ?Sized,
{
    let parts = split_batch(input, chunks)?;
    let grad_enabled = is_grad_enabled();

    let outputs = parts
        .par_iter()
        .map(|part| {
            let _guard = guard_like_caller(grad_enabled);
            module.forward(part)
        })
        .collect::<Result<Vec<_>, _>>()?;
    ops::cat(&outputs, 0)
}

/// Whether `z` carries one entry per row of `x` along axis 0.
fn shares_batch_axis(x: &Tensor, z: &Tensor) -> bool {
    x.ndim() > 0 && z.ndim() == x.ndim() && z.shape()[0] == x.shape()[0]
}

/// Two-input counterpart of [`parallel_forward`]. `x` is split along the
/// batch axis; `z` is split alongside it when it has the same batch axis,
/// otherwise (e.g. `[latent_dim]` or `[1, latent_dim]`) every chunk sees the
/// whole of `z`, which the module broadcasts as in a plain forward.
pub fn parallel_forward_conditional<M>(
    module: &M,
    x: &Tensor,
    z: &Tensor,
    chunks: usize,
) -> Result<Tensor, TensorError>
where
    M: ConditionalModule + ?Sized,
{
    let x_parts = split_batch(x, chunks)?;
    let z_parts = if shares_batch_axis(x, z) {
        split_batch(z, chunks)?
    } else {
        vec![z.clone(); x_parts.len()]
    };
    let grad_enabled = is_grad_enabled();

    let outputs = x_parts
        .par_iter()
        .zip(z_parts.par_iter())
        .map(|(x_part, z_part)| {
            let _guard = guard_like_caller(grad_enabled);
            module.forward(x_part, z_part)
        })
        .collect::<Result<Vec<_>, _>>()?;
    ops::cat(&outputs, 0)
}
