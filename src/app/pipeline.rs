//! Shared fit pipeline.
//!
//! Per fit: preprocess → regress → goodness of fit (+ cross-validation) →
//! derived quantities → plot range + overlay → table entry.
//!
//! Table entries are collected per fit and the grid is assembled only after
//! every fit has finished.

use tracing::info;

use crate::config::{FitPlan, FitSpec};
use crate::domain::{DataSet, DerivedQuantity, FitOutcome, GoodnessOfFit, RenderContext, TableEntry};
use crate::error::AppError;
use crate::fit::{fit_target, prepare_series, FitTarget};
use crate::io::load_dataset;
use crate::propagate::propagate;
use crate::range::{build_overlay, resolve_range, Overlay};
use crate::report::{ColumnTitles, ParamTable};
use crate::stats::{goodness_of_fit, leave_one_out};

/// Everything computed for one fit.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub name: String,
    pub model: String,
    pub param_names: Vec<String>,
    pub outcome: FitOutcome,
    pub gof: GoodnessOfFit,
    pub derived: Vec<DerivedQuantity>,
    /// Resolved x-range of the overlay.
    pub range: (f64, f64),
    pub overlay: Overlay,
    /// Present only when LaTeX labels were supplied.
    pub entry: Option<TableEntry>,
    pub print_residuals: bool,
}

/// All outputs of one plan.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub runs: Vec<FitRun>,
    pub table: ParamTable,
}

/// Load the plan's data source and run every fit.
pub fn run_plan(plan: &FitPlan) -> Result<RunOutput, AppError> {
    let data = load_dataset(&plan.data)?;
    run_plan_with_data(plan, &data)
}

/// Run every fit of `plan` against an already loaded data set.
pub fn run_plan_with_data(plan: &FitPlan, data: &DataSet) -> Result<RunOutput, AppError> {
    let specs = plan.resolve()?;
    let mut runs = Vec::with_capacity(specs.len());
    for spec in &specs {
        let run = run_fit(spec, data, &plan.render).map_err(|e| e.with_fit(spec.name.clone()))?;
        runs.push(run);
    }

    let entries: Vec<TableEntry> = runs.iter().filter_map(|r| r.entry.clone()).collect();
    let mut table = ParamTable::from_entries(&entries);
    if let Some([label, value]) = &plan.column_titles {
        table = table.with_titles(ColumnTitles {
            label: label.clone(),
            value: value.clone(),
        });
    }
    Ok(RunOutput { runs, table })
}

/// Run a single resolved fit.
pub fn run_fit(spec: &FitSpec, data: &DataSet, ctx: &RenderContext) -> Result<FitRun, AppError> {
    let series = prepare_series(data, spec.data_index, spec.interval, spec.excluded)?;
    let target = FitTarget::new(&series, spec.options.log_base)?;
    let outcome = fit_target(&spec.model, &spec.start, &target, &spec.options)?;
    let params = &outcome.result.params;
    let errors = &outcome.result.errors;

    let mut gof = goodness_of_fit(&spec.model, &target, params);
    if spec.options.cross_validate {
        gof.cross_validation = Some(leave_one_out(&spec.model, params, &target, &spec.options));
    }

    let family = spec.model.family();
    let derived = propagate(family, params, errors)?;

    let range = resolve_range(spec.plot_range, ctx, series.interval, |x| spec.model.eval(x, params));
    let overlay = build_overlay(&spec.model, params, range, series.excluded);

    let entry = spec
        .labels
        .as_ref()
        .map(|labels| crate::report::build_table_entry(&spec.name, labels, params, errors, &gof, family, &derived));

    info!(
        fit = %spec.name,
        model = spec.model.name(),
        n = gof.n,
        method = outcome.diagnostics.method.display_name(),
        rmse = gof.rmse,
        "fit complete"
    );

    Ok(FitRun {
        name: spec.name.clone(),
        model: spec.model.name().to_string(),
        param_names: spec.model.param_names().to_vec(),
        outcome,
        gof,
        derived,
        range,
        overlay,
        entry,
        print_residuals: spec.print_residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Series, Uncertainty};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn plan(json: &str) -> FitPlan {
        FitPlan::from_json(json).unwrap()
    }

    fn noisy_line() -> DataSet {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.3).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x + 1.0 + noise.sample(&mut rng)).collect();
        DataSet {
            series: vec![Series {
                x,
                y,
                x_err: Uncertainty::Absent,
                y_err: Uncertainty::Scalar(0.05),
            }],
        }
    }

    #[test]
    fn runs_a_labelled_line_fit_end_to_end() {
        let plan = plan(
            r#"{ "data": { "path": "unused.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [-1.0, 10.0] },
                 "fits": { "model": "Linear", "start": [1.0, 0.0], "plot_range": "fit",
                           "cross_validate": true,
                           "labels": { "function": "A x + B", "params": ["A", "B"] } } }"#,
        );
        let out = run_plan_with_data(&plan, &noisy_line()).unwrap();
        assert_eq!(out.runs.len(), 1);
        let run = &out.runs[0];
        assert!((run.outcome.result.params[0] - 2.0).abs() < 0.02);
        assert!((run.outcome.result.params[1] - 1.0).abs() < 0.05);
        assert_eq!(run.range, (0.0, 29.0 * 0.3));
        let cv = run.gof.cross_validation.unwrap();
        assert_eq!(cv.attempted, 30);
        assert_eq!(cv.succeeded, 30);

        let entry = run.entry.as_ref().unwrap();
        let labels: Vec<&str> = entry.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "\\chi^2 / \\mathrm{DoF}", "R^2"]);
        assert!(out.table.to_latex().contains("\\multicolumn{2}{c}{Fit 1}"));
    }

    #[test]
    fn unlabelled_fits_stay_out_of_the_table() {
        let plan = plan(
            r#"{ "data": { "path": "unused.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 10.0] },
                 "fits": { "model": "Linear" } }"#,
        );
        let out = run_plan_with_data(&plan, &noisy_line()).unwrap();
        assert!(out.runs[0].entry.is_none());
        assert!(out.table.is_empty());
    }

    #[test]
    fn errors_carry_the_fit_name() {
        let plan = plan(
            r#"{ "data": { "path": "unused.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 10.0] },
                 "fits": { "model": "Linear", "name": "narrow", "interval": [100.0, 200.0] } }"#,
        );
        let err = run_plan_with_data(&plan, &noisy_line()).unwrap_err();
        assert_eq!(err.fit(), Some("narrow"));
        assert_eq!(err.exit_code(), 3);
    }
}
