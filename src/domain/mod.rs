//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw input series and uncertainties (`Series`, `Uncertainty`)
//! - fit options (`FitOptions`, `Method`, `RobustLoss`, `OdrJob`)
//! - model family descriptors (`ModelFamily`, `PeakFamily`)
//! - fit outputs (`FitResult`, `GoodnessOfFit`, `DerivedQuantity`, `TableEntry`)

pub mod types;

pub use types::*;
