//! # Neural Network Layer Modules
//!
//! Contains the layers the SIREN networks are assembled from.

pub mod linear;
pub use linear::Linear;

pub mod activation;
pub use activation::{Sigmoid, Sine};
