//! Fit quality: goodness-of-fit statistics and leave-one-out cross-validation.

pub mod cv;
pub mod gof;

pub use cv::leave_one_out;
pub use gof::{goodness_of_fit, r_squared};
