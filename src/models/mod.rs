//! Parametric model implementations.
//!
//! Models are small, pure functions of `(x, params)` so that the fitting code
//! can stay generic over built-in and caller-defined models.

pub mod catalog;
pub mod model;

pub use catalog::{catalog_names, lookup};
pub use model::*;
