//! Command-line parsing.
//!
//! Argument parsing and command dispatch stay separate from the fitting and
//! formatting code; `app` turns these structs into pipeline calls.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ezfit", version, about = "Parametric curve fitting with uncertainty propagation")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every fit of a JSON plan, print summaries and write the LaTeX table.
    Fit(FitArgs),
    /// Format a value and its uncertainty in `value(digits)` notation.
    Format(FormatArgs),
    /// List the built-in models and their parameters.
    Models,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Fit plan (JSON).
    #[arg(long, value_name = "JSON")]
    pub plan: PathBuf,

    /// Directory for `plot.tex` (overrides the plan's `out_dir`).
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Export all fit results to JSON.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct FormatArgs {
    /// Central value; scientific notation such as `-2.5e-7` is accepted.
    #[arg(allow_hyphen_values = true)]
    pub value: f64,
    #[arg(allow_hyphen_values = true)]
    pub error: f64,
}
