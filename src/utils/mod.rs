//! # Utility Functions (`utils`)
//!
//! Provides helper functions for parallelism and configuration serialization.

pub mod parallel;
pub mod serialization;

pub use parallel::{parallel_forward, parallel_forward_conditional};
pub use serialization::{decode_config, encode_config, read_config, write_config};
