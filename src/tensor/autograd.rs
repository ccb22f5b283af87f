//! # Automatic Differentiation (Autograd)
//!
//! Implements the reverse-mode automatic differentiation engine.
//! Every differentiable op records an [`AutogradContext`] holding its inputs
//! and a [`BackwardOp`]; `backward` walks these contexts in reverse
//! topological order and accumulates gradients into leaf tensors.

use super::{Tensor, TensorData, TensorError};
use ndarray::ArrayD;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

// --- Grad mode ---

thread_local! {
    static GRAD_ENABLED: Cell<bool> = Cell::new(true);
}

/// Returns whether ops on the current thread record autograd contexts.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// RAII guard disabling gradient recording on the current thread.
/// The previous mode is restored on drop, so guards nest.
#[derive(Debug)]
pub struct NoGradGuard {
    prev: bool,
}

impl NoGradGuard {
    pub fn new() -> Self {
        let prev = GRAD_ENABLED.with(|enabled| enabled.replace(false));
        NoGradGuard { prev }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|enabled| enabled.set(self.prev));
    }
}

/// Runs `f` with gradient recording disabled, like `torch.no_grad()`.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = NoGradGuard::new();
    f()
}

// --- Backward Operation Trait ---

/// Trait defining the backward pass for an operation.
/// Each operation (like Add, Sin, MatMul) has a struct implementing this.
pub trait BackwardOp: Debug + Send + Sync + 'static {
    /// Computes the gradients with respect to the inputs of the operation.
    ///
    /// # Arguments
    /// * `inputs` - The input tensors of the original forward operation.
    /// * `output_grad` - The gradient flowing back into this operation's output.
    ///
    /// # Returns
    /// One gradient per input, in the same order and shape as `inputs`.
    fn backward(
        &self,
        inputs: &[Tensor],
        output_grad: &ArrayD<TensorData>,
    ) -> Result<Vec<ArrayD<TensorData>>, TensorError>;
}

// --- Autograd Context ---

/// A node of the computation graph: the inputs of one op and how to
/// differentiate it.
pub struct AutogradContext {
    inputs: Vec<Tensor>,
    op: Box<dyn BackwardOp>,
}

impl AutogradContext {
    pub fn new(inputs: Vec<Tensor>, op: Box<dyn BackwardOp>) -> Self {
        AutogradContext { inputs, op }
    }

    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    pub fn op(&self) -> &dyn BackwardOp {
        self.op.as_ref()
    }
}

impl Debug for AutogradContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutogradContext")
            .field("op", &self.op)
            .field("num_inputs", &self.inputs.len())
            .finish()
    }
}

fn ctx_id(ctx: &Arc<AutogradContext>) -> usize {
    Arc::as_ptr(ctx) as usize
}

/// Orders the graph reachable from `root` so that every context appears
/// after all contexts producing its inputs.
fn topological_order(root: &Arc<AutogradContext>) -> Vec<Arc<AutogradContext>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(Arc::clone(root), false)];

    while let Some((ctx, expanded)) = stack.pop() {
        if expanded {
            order.push(ctx);
            continue;
        }
        if !visited.insert(ctx_id(&ctx)) {
            continue;
        }
        stack.push((Arc::clone(&ctx), true));
        for input in ctx.inputs() {
            if let Some(child) = input.grad_fn() {
                if !visited.contains(&ctx_id(child)) {
                    stack.push((Arc::clone(child), false));
                }
            }
        }
    }
    order
}

/// Propagates `seed` (the gradient of the final output w.r.t. `root`) back
/// through the graph, accumulating into every leaf that requires grad.
pub fn backward(root: &Tensor, seed: ArrayD<TensorData>) -> Result<(), TensorError> {
    let root_ctx = match root.grad_fn() {
        Some(ctx) => Arc::clone(ctx),
        None => return root.accumulate_grad(&seed),
    };

    let order = topological_order(&root_ctx);
    let mut pending: HashMap<usize, ArrayD<TensorData>> = HashMap::new();
    pending.insert(ctx_id(&root_ctx), seed);

    for ctx in order.iter().rev() {
        let Some(grad) = pending.remove(&ctx_id(ctx)) else {
            continue;
        };

        let input_grads = ctx.op().backward(ctx.inputs(), &grad)?;
        if input_grads.len() != ctx.inputs().len() {
            return Err(TensorError::AutogradError(format!(
                "{:?} returned {} gradients for {} inputs",
                ctx.op(),
                input_grads.len(),
                ctx.inputs().len()
            )));
        }

        for (input, input_grad) in ctx.inputs().iter().zip(input_grads) {
            if !input.requires_grad() {
                continue;
            }
            match input.grad_fn() {
                Some(child) => match pending.get_mut(&ctx_id(child)) {
                    Some(existing) => *existing += &input_grad,
                    None => {
                        pending.insert(ctx_id(child), input_grad);
                    }
                },
                None => input.accumulate_grad(&input_grad)?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::ops;

    #[test]
    fn no_grad_guard_nests_and_restores() {
        assert!(is_grad_enabled());
        {
            let _outer = NoGradGuard::new();
            assert!(!is_grad_enabled());
            no_grad(|| assert!(!is_grad_enabled()));
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn ops_under_no_grad_record_nothing() {
        let x = Tensor::from_vec(vec![1.0, 2.0], &[2], true).unwrap();
        let y = no_grad(|| ops::sin(&x)).unwrap();
        assert!(!y.requires_grad());
        assert!(y.is_leaf());
    }

    #[test]
    fn shared_input_accumulates_over_both_paths() {
        // y = sum(x + x) => dy/dx = 2
        let x = Tensor::from_vec(vec![1.0, -3.0, 0.5], &[3], true).unwrap();
        let doubled = ops::add(&x, &x).unwrap();
        let y = ops::sum(&doubled).unwrap();
        y.backward().unwrap();
        assert_eq!(x.grad().unwrap().to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn diamond_graph_visits_each_node_once() {
        // h = 3x; y = sum(h + sin(h)) => dy/dx = 3 (1 + cos(3x))
        let x = Tensor::from_vec(vec![0.2, 0.7], &[2], true).unwrap();
        let h = ops::mul_scalar(&x, 3.0).unwrap();
        let y = ops::sum(&ops::add(&h, &ops::sin(&h).unwrap()).unwrap()).unwrap();
        y.backward().unwrap();

        let grad = x.grad().unwrap().to_vec();
        for (g, xv) in grad.iter().zip([0.2f32, 0.7]) {
            let expected = 3.0 * (1.0 + (3.0 * xv).cos());
            assert!((g - expected).abs() < 1e-5, "{g} vs {expected}");
        }
    }

    #[test]
    fn repeated_backward_accumulates_into_leaves() {
        let x = Tensor::from_vec(vec![1.0], &[1], true).unwrap();
        for _ in 0..2 {
            let y = ops::mul_scalar(&x, 5.0).unwrap();
            y.backward().unwrap();
        }
        assert_eq!(x.grad().unwrap().to_vec(), vec![10.0]);
    }
}
