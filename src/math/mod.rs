//! Numerical utilities: covariance estimation, least squares, special functions.

pub mod covariance;
pub mod lstsq;
pub mod special;

pub use covariance::*;
pub use lstsq::*;
