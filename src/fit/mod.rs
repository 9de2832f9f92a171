//! Regression.
//!
//! Responsibilities:
//!
//! - preprocess a raw series into aligned, masked arrays (`prepare`)
//! - minimise (robust) weighted least squares with optional bounds (`solver`)
//! - orthogonal distance regression (`odr`)
//! - dispatch between them behind one `fit` call (`backend`)

pub mod backend;
pub mod odr;
pub mod prepare;
pub mod solver;

pub use backend::{fit, fit_target, FitTarget};
pub use prepare::{log_transform, prepare, prepare_series, PreparedSeries};
