//! # Tensor Module
//!
//! This module defines the core `Tensor` struct and related functionalities,
//! including the error type, differentiable operations and automatic
//! differentiation.

use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// --- Submodules ---
pub mod autograd;
pub mod ops;

// --- Re-exports ---
pub use autograd::{is_grad_enabled, no_grad, AutogradContext, BackwardOp, NoGradGuard};

// --- Error Handling ---
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Incompatible shapes for operation {op}: {shape1:?} and {shape2:?}")]
    IncompatibleShapes {
        op: String,
        shape1: Vec<usize>,
        shape2: Vec<usize>,
    },
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    #[error("Axis {axis} out of range for tensor with {ndim} dimensions")]
    AxisOutOfRange { axis: usize, ndim: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("ndarray error: {0}")]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Autograd error: {0}")]
    AutogradError(String),
    #[error("Generic error: {0}")]
    Generic(String),
}

/// Element type of every tensor in the crate.
pub type TensorData = f32;

/// # Tensor
///
/// The core data structure for numerical computation, similar to PyTorch's Tensor.
/// It wraps an `ndarray::ArrayD` for storage and includes metadata for autograd.
///
/// Cloning a `Tensor` is cheap: clones share the same storage and the same
/// gradient slot, so a parameter returned from `Module::parameters` observes
/// gradients written by `backward`.
#[derive(Clone)]
pub struct Tensor {
    // Shared storage; in-place initialization writes through the lock.
    data: Arc<RwLock<ArrayD<TensorData>>>,

    // Shape information (redundant with ndarray but useful for quick access)
    shape: Vec<usize>,

    // Set on tensors produced by an op while grad mode was enabled.
    grad_context: Option<Arc<AutogradContext>>,
    grad: Arc<Mutex<Option<ArrayD<TensorData>>>>,

    requires_grad: bool,
    is_leaf: bool,
}

impl Tensor {
    /// Creates a new leaf Tensor from an ndarray::ArrayD.
    pub fn new(data: ArrayD<TensorData>, requires_grad: bool) -> Self {
        let shape = data.shape().to_vec();
        Tensor {
            data: Arc::new(RwLock::new(data)),
            shape,
            grad_context: None,
            grad: Arc::new(Mutex::new(None)),
            requires_grad,
            is_leaf: true,
        }
    }

    /// Creates a leaf Tensor from a flat vector laid out in row-major order.
    pub fn from_vec(
        data: Vec<TensorData>,
        shape: &[usize],
        requires_grad: bool,
    ) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(Tensor::new(array, requires_grad))
    }

    /// Creates a Tensor that is not a leaf node (i.e., result of an operation).
    pub(crate) fn from_op(data: ArrayD<TensorData>, grad_context: Arc<AutogradContext>) -> Self {
        let shape = data.shape().to_vec();
        Tensor {
            data: Arc::new(RwLock::new(data)),
            shape,
            grad_context: Some(grad_context),
            grad: Arc::new(Mutex::new(None)),
            requires_grad: true,
            is_leaf: false,
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub(crate) fn grad_fn(&self) -> Option<&Arc<AutogradContext>> {
        self.grad_context.as_ref()
    }

    /// Provides read-only access to the underlying data.
    pub fn data(&self) -> RwLockReadGuard<'_, ArrayD<TensorData>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Provides mutable access to the underlying data.
    /// Writes are invisible to autograd; callers use this for initialization
    /// and other non-differentiable updates only.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, ArrayD<TensorData>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clones the underlying data into a new ArrayD.
    pub fn data_clone(&self) -> ArrayD<TensorData> {
        self.data().clone()
    }

    /// Copies the elements out in logical (row-major) order.
    pub fn to_vec(&self) -> Vec<TensorData> {
        self.data().iter().copied().collect()
    }

    /// Returns the value of a single-element tensor.
    pub fn item(&self) -> Result<TensorData, TensorError> {
        if self.size() != 1 {
            return Err(TensorError::ShapeMismatch {
                expected: vec![1],
                got: self.shape.clone(),
            });
        }
        self.data()
            .iter()
            .next()
            .copied()
            .ok_or_else(|| TensorError::Generic("empty tensor".to_string()))
    }

    /// Detaches the tensor from the computation graph.
    /// Returns a new tensor sharing the same data but without autograd history.
    pub fn detach(&self) -> Self {
        Tensor {
            data: Arc::clone(&self.data),
            shape: self.shape.clone(),
            grad_context: None,
            grad: Arc::new(Mutex::new(None)),
            requires_grad: false,
            is_leaf: true,
        }
    }

    fn grad_slot(&self) -> MutexGuard<'_, Option<ArrayD<TensorData>>> {
        self.grad.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accumulates gradient. Used internally by autograd.
    pub(crate) fn accumulate_grad(&self, incoming: &ArrayD<TensorData>) -> Result<(), TensorError> {
        if !self.requires_grad {
            return Ok(());
        }
        if self.shape() != incoming.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.clone(),
                got: incoming.shape().to_vec(),
            });
        }

        let mut slot = self.grad_slot();
        match slot.as_mut() {
            Some(existing) => *existing += incoming,
            None => *slot = Some(incoming.clone()),
        }
        Ok(())
    }

    /// Retrieves the gradient tensor, if one has been computed.
    /// The returned tensor is a detached copy.
    pub fn grad(&self) -> Option<Tensor> {
        self.grad_slot()
            .as_ref()
            .map(|grad| Tensor::new(grad.clone(), false))
    }

    /// Zeroes the gradient of the tensor if it exists.
    pub fn zero_grad(&self) {
        if let Some(grad) = self.grad_slot().as_mut() {
            grad.fill(0.0);
        }
    }

    /// Initiates the backward pass to compute gradients.
    /// Starts from this tensor, which must be a scalar: zero-dimensional
    /// (as returned by `ops::sum`) or any other single-element shape.
    pub fn backward(&self) -> Result<(), TensorError> {
        if !self.requires_grad {
            return Err(TensorError::AutogradError(
                "Cannot call backward on tensor that does not require grad".to_string(),
            ));
        }
        if self.size() != 1 {
            return Err(TensorError::AutogradError(format!(
                "Backward can only be called on scalar (single-element) tensors, got shape {:?}",
                self.shape
            )));
        }

        let seed = ArrayD::ones(IxDyn(&self.shape));
        autograd::backward(self, seed)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Tensor");
        debug
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .field("is_leaf", &self.is_leaf);
        if let Some(ctx) = &self.grad_context {
            debug.field("grad_fn", ctx);
        }
        debug.finish()
    }
}

// --- Traits Implementation ---
use std::ops::Add;

// Tensor + Tensor
impl Add<&Tensor> for &Tensor {
    type Output = Result<Tensor, TensorError>;

    fn add(self, other: &Tensor) -> Self::Output {
        ops::add(self, other)
    }
}

impl Add<Tensor> for Tensor {
    type Output = Result<Tensor, TensorError>;

    fn add(self, other: Tensor) -> Self::Output {
        ops::add(&self, &other)
    }
}

// --- Helper functions ---

/// Helper to create a tensor filled with zeros.
pub fn zeros(shape: &[usize], requires_grad: bool) -> Tensor {
    Tensor::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
}

/// Helper to create a tensor filled with ones.
pub fn ones(shape: &[usize], requires_grad: bool) -> Tensor {
    Tensor::new(ArrayD::ones(IxDyn(shape)), requires_grad)
}

/// Helper to create a tensor with values drawn from `U[low, high)`.
pub fn rand_uniform(
    shape: &[usize],
    low: TensorData,
    high: TensorData,
    requires_grad: bool,
) -> Result<Tensor, TensorError> {
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(TensorError::InvalidConfig(format!(
            "uniform range must satisfy low < high, got [{low}, {high})"
        )));
    }
    let dist = Uniform::new(low, high);
    let mut rng = rand::thread_rng();
    let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || dist.sample(&mut rng));
    Ok(Tensor::new(data, requires_grad))
}
