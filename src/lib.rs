//! `ezfit` library crate.
//!
//! Parametric curve fitting over tabular data with parameter uncertainties,
//! goodness-of-fit statistics, derived peak quantities and a LaTeX parameter
//! table. The binary is a thin wrapper around this library.

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod propagate;
pub mod range;
pub mod report;
pub mod stats;
