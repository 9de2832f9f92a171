//! Export fit results to JSON.
//!
//! The export carries everything a plot sink or downstream script needs:
//! parameters with uncertainties, solver diagnostics, statistics, derived
//! quantities and the sampled overlay curves.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::FitRun;
use crate::domain::{DerivedQuantity, GoodnessOfFit, SolverDiagnostics};
use crate::error::{AppError, Stage};
use crate::range::Overlay;

#[derive(Debug, Clone, Serialize)]
pub struct ResultsFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub fits: Vec<FitRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamRecord {
    pub name: String,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitRecord {
    pub name: String,
    pub model: String,
    pub params: Vec<ParamRecord>,
    /// Row-major parameter covariance, when the backend produced one.
    pub covariance: Option<Vec<Vec<f64>>>,
    pub diagnostics: SolverDiagnostics,
    pub goodness_of_fit: GoodnessOfFit,
    pub derived: Vec<DerivedQuantity>,
    pub range: [f64; 2],
    pub overlay: Overlay,
}

impl FitRecord {
    pub fn from_run(run: &FitRun) -> Self {
        let result = &run.outcome.result;
        let params = run
            .param_names
            .iter()
            .zip(result.params.iter().zip(&result.errors))
            .map(|(name, (value, error))| ParamRecord {
                name: name.clone(),
                value: *value,
                error: *error,
            })
            .collect();
        let covariance = result.covariance.as_ref().map(|c| {
            (0..c.nrows())
                .map(|i| (0..c.ncols()).map(|j| c[(i, j)]).collect())
                .collect()
        });
        Self {
            name: run.name.clone(),
            model: run.model.clone(),
            params,
            covariance,
            diagnostics: run.outcome.diagnostics.clone(),
            goodness_of_fit: run.gof.clone(),
            derived: run.derived.clone(),
            range: [run.range.0, run.range.1],
            overlay: run.overlay.clone(),
        }
    }
}

/// Build the export document for `runs`.
pub fn results_file(runs: &[FitRun]) -> ResultsFile {
    ResultsFile {
        tool: "ezfit".to_string(),
        created_at: Utc::now(),
        fits: runs.iter().map(FitRecord::from_run).collect(),
    }
}

/// Write all fit results to a pretty-printed JSON file.
pub fn write_results_json(path: &Path, runs: &[FitRun]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::io(
            Stage::Output,
            format!("failed to create export JSON '{}': {e}", path.display()),
        )
    })?;
    serde_json::to_writer_pretty(file, &results_file(runs))
        .map_err(|e| AppError::io(Stage::Output, format!("failed to write export JSON: {e}")))?;
    Ok(())
}
