//! JSON fit plan.
//!
//! A plan describes one tabular data source, the visible axis state and a
//! number of fits. Every per-fit setting is a [`PerSeries`]: a base value that
//! applies to all fits plus optional overrides keyed by fit index. A plain
//! value is shorthand for a base without overrides.
//!
//! ```json
//! {
//!   "data": { "path": "peaks.csv", "x_columns": ["E"], "y_columns": ["N"],
//!             "y_error_columns": ["dN"] },
//!   "render": { "x_limits": [0.0, 10.0] },
//!   "count": 2,
//!   "fits": {
//!     "model": { "base": "Linear", "overrides": { "1": "ExpFit" } },
//!     "start": { "base": [1.0, 0.0], "overrides": { "1": [1.0, -0.5] } },
//!     "plot_range": "fit"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{
    Bounds, FitOptions, Interval, Method, OdrJob, RenderContext, RobustLoss, SigmaScaling, SolverSettings,
    SymbolicLabels,
};
use crate::error::{AppError, Stage};
use crate::models::{lookup, Model};
use crate::range::PlotRange;

/// Top-level plan file.
#[derive(Debug, Clone, Deserialize)]
pub struct FitPlan {
    pub data: DataSource,
    pub render: RenderContext,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    /// Number of fits described by `fits`.
    #[serde(default = "default_count")]
    pub count: usize,
    /// Titles of the label/value column pair in the LaTeX table.
    #[serde(default)]
    pub column_titles: Option<[String; 2]>,
    #[serde(default)]
    pub fits: FitSettings,
}

fn default_count() -> usize {
    1
}

/// Delimited text source with one column per series coordinate.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSource {
    pub path: PathBuf,
    #[serde(default = "default_separator")]
    pub separator: char,
    #[serde(default = "default_decimal")]
    pub decimal: char,
    pub x_columns: Vec<String>,
    pub y_columns: Vec<String>,
    /// Per series; missing entries mean "no uncertainty".
    #[serde(default)]
    pub x_error_columns: Vec<ErrorColumn>,
    #[serde(default)]
    pub y_error_columns: Vec<ErrorColumn>,
}

fn default_separator() -> char {
    ','
}

fn default_decimal() -> char {
    '.'
}

/// Source of one series' uncertainty: a column name, a constant, or the
/// `"[NULL]"` marker (no uncertainty).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorColumn {
    Value(f64),
    Column(String),
}

impl ErrorColumn {
    pub const NULL_MARKER: &'static str = "[NULL]";
}

/// A base value with per-fit overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct PerSeries<T> {
    pub base: T,
    pub overrides: BTreeMap<usize, T>,
}

impl<T> PerSeries<T> {
    pub fn new(base: T) -> Self {
        Self {
            base,
            overrides: BTreeMap::new(),
        }
    }

    /// Value for fit `index`.
    pub fn get(&self, index: usize) -> &T {
        self.overrides.get(&index).unwrap_or(&self.base)
    }

    fn indices(&self) -> Vec<usize> {
        self.overrides.keys().copied().collect()
    }
}

impl<T: Default> Default for PerSeries<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Deserialize)]
struct FullRepr<T> {
    base: T,
    #[serde(default = "BTreeMap::new")]
    overrides: BTreeMap<usize, T>,
}

impl<'de, T: serde::de::DeserializeOwned> Deserialize<'de> for PerSeries<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        // Only an object carrying `base` is the long form; anything else is a
        // plain base value.
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_full = value.as_object().is_some_and(|o| o.contains_key("base"));
        if is_full {
            let full: FullRepr<T> = serde_json::from_value(value).map_err(D::Error::custom)?;
            Ok(Self {
                base: full.base,
                overrides: full.overrides,
            })
        } else {
            serde_json::from_value(value).map(Self::new).map_err(D::Error::custom)
        }
    }
}

/// One side of the parameter box; `null` entries mean unbounded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BoundSide {
    Scalar(Option<f64>),
    List(Vec<Option<f64>>),
}

impl Default for BoundSide {
    fn default() -> Self {
        BoundSide::List(Vec::new())
    }
}

impl BoundSide {
    fn resolve(&self, fill: f64) -> Vec<f64> {
        match self {
            BoundSide::Scalar(v) => vec![v.unwrap_or(fill)],
            BoundSide::List(vs) => vs.iter().map(|v| v.unwrap_or(fill)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BoundsSpec {
    #[serde(default)]
    pub lower: BoundSide,
    #[serde(default)]
    pub upper: BoundSide,
}

impl BoundsSpec {
    pub fn to_bounds(&self) -> Bounds {
        Bounds::new(
            self.lower.resolve(f64::NEG_INFINITY),
            self.upper.resolve(f64::INFINITY),
        )
    }
}

/// Per-fit settings, each resolvable per fit index.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub model: PerSeries<String>,
    /// Start values; all ones when absent.
    pub start: PerSeries<Option<Vec<f64>>>,
    /// Series index into the data source; defaults to the fit index.
    pub data_index: PerSeries<Option<usize>>,
    pub interval: PerSeries<Option<Interval>>,
    pub excluded: PerSeries<Option<Interval>>,
    pub plot_range: PerSeries<PlotRange>,
    pub method: PerSeries<Method>,
    pub bounds: PerSeries<BoundsSpec>,
    pub log_base: PerSeries<Option<f64>>,
    pub loss: PerSeries<Option<RobustLoss>>,
    pub loss_scale: PerSeries<f64>,
    pub odr_job: PerSeries<OdrJob>,
    pub sigma_scaling: PerSeries<SigmaScaling>,
    pub cross_validate: PerSeries<bool>,
    pub print_residuals: PerSeries<bool>,
    pub name: PerSeries<Option<String>>,
    pub labels: PerSeries<Option<SymbolicLabels>>,
    pub solver: PerSeries<SolverSettings>,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            model: PerSeries::new("Linear".to_string()),
            start: PerSeries::default(),
            data_index: PerSeries::default(),
            interval: PerSeries::default(),
            excluded: PerSeries::default(),
            plot_range: PerSeries::default(),
            method: PerSeries::default(),
            bounds: PerSeries::default(),
            log_base: PerSeries::default(),
            loss: PerSeries::default(),
            loss_scale: PerSeries::new(1.0),
            odr_job: PerSeries::default(),
            sigma_scaling: PerSeries::default(),
            cross_validate: PerSeries::default(),
            print_residuals: PerSeries::default(),
            name: PerSeries::default(),
            labels: PerSeries::default(),
            solver: PerSeries::default(),
        }
    }
}

/// Fully resolved settings of one fit.
#[derive(Debug, Clone)]
pub struct FitSpec {
    pub index: usize,
    pub name: String,
    pub model: Model,
    pub start: Vec<f64>,
    pub data_index: usize,
    pub interval: Option<Interval>,
    pub excluded: Option<Interval>,
    pub plot_range: PlotRange,
    pub options: FitOptions,
    pub print_residuals: bool,
    pub labels: Option<SymbolicLabels>,
}

impl FitPlan {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::io(Stage::Config, format!("failed to read plan '{}': {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        serde_json::from_str(text).map_err(|e| AppError::invalid(Stage::Config, format!("invalid fit plan: {e}")))
    }

    /// Resolve every fit in index order.
    pub fn resolve(&self) -> Result<Vec<FitSpec>, AppError> {
        if let Some(&max) = self.overridden_indices().last() {
            if max >= self.count {
                return Err(AppError::invalid(
                    Stage::Config,
                    format!("override for fit {max} but count is {}", self.count),
                ));
            }
        }
        (0..self.count).map(|i| self.resolve_one(i)).collect()
    }

    fn resolve_one(&self, i: usize) -> Result<FitSpec, AppError> {
        let s = &self.fits;
        let model_name = s.model.get(i);
        let model = lookup(model_name).ok_or_else(|| {
            AppError::invalid(Stage::Config, format!("unknown model '{model_name}' for fit {i}"))
        })?;
        let name = s.name.get(i).clone().unwrap_or_else(|| format!("Fit {}", i + 1));

        let start = s.start.get(i).clone().unwrap_or_else(|| vec![1.0; model.param_count()]);
        if let Some(labels) = s.labels.get(i) {
            if labels.params.len() != model.param_count() {
                return Err(AppError::invalid(
                    Stage::Config,
                    format!(
                        "{} parameter labels for {} with {} parameters",
                        labels.params.len(),
                        model.name(),
                        model.param_count()
                    ),
                )
                .with_fit(name));
            }
        }

        let options = FitOptions {
            method: *s.method.get(i),
            bounds: s.bounds.get(i).to_bounds(),
            log_base: *s.log_base.get(i),
            loss: *s.loss.get(i),
            loss_scale: *s.loss_scale.get(i),
            odr_job: *s.odr_job.get(i),
            sigma_scaling: *s.sigma_scaling.get(i),
            solver: *s.solver.get(i),
            cross_validate: *s.cross_validate.get(i),
        };

        Ok(FitSpec {
            index: i,
            name,
            model,
            start,
            data_index: s.data_index.get(i).unwrap_or(i),
            interval: *s.interval.get(i),
            excluded: *s.excluded.get(i),
            plot_range: *s.plot_range.get(i),
            options,
            print_residuals: *s.print_residuals.get(i),
            labels: s.labels.get(i).clone(),
        })
    }

    fn overridden_indices(&self) -> Vec<usize> {
        let s = &self.fits;
        let mut keys: Vec<usize> = [
            s.model.indices(),
            s.start.indices(),
            s.data_index.indices(),
            s.interval.indices(),
            s.excluded.indices(),
            s.plot_range.indices(),
            s.method.indices(),
            s.bounds.indices(),
            s.log_base.indices(),
            s.loss.indices(),
            s.loss_scale.indices(),
            s.odr_job.indices(),
            s.sigma_scaling.indices(),
            s.cross_validate.indices(),
            s.print_residuals.indices(),
            s.name.indices(),
            s.labels.indices(),
            s.solver.indices(),
        ]
        .concat();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Endpoint;

    const PLAN: &str = r#"{
        "data": { "path": "data.csv", "separator": ";", "decimal": ",",
                  "x_columns": ["t", "t"], "y_columns": ["a", "b"],
                  "y_error_columns": ["da", "[NULL]"], "x_error_columns": [0.1] },
        "render": { "x_limits": [0.0, 10.0] },
        "count": 2,
        "fits": {
            "model": { "base": "Linear", "overrides": { "1": "ExpFit" } },
            "start": [1.0, 0.5],
            "bounds": { "lower": [0.0, null], "upper": null },
            "plot_range": ["fit", { "cross": 1.5 }],
            "method": { "base": "lm", "overrides": { "1": "odr" } },
            "labels": { "function": "A x + B", "params": ["A", "B"] }
        }
    }"#;

    #[test]
    fn parses_plan_with_overrides() {
        let plan = FitPlan::from_json(PLAN).unwrap();
        assert_eq!(plan.data.separator, ';');
        assert_eq!(plan.data.decimal, ',');
        assert_eq!(
            plan.data.y_error_columns,
            vec![ErrorColumn::Column("da".to_string()), ErrorColumn::Column("[NULL]".to_string())]
        );
        assert_eq!(plan.data.x_error_columns, vec![ErrorColumn::Value(0.1)]);

        let specs = plan.resolve().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].model.name(), "Linear");
        assert_eq!(specs[1].model.name(), "ExpFit");
        assert_eq!(specs[0].options.method, Method::Lm);
        assert_eq!(specs[1].options.method, Method::Odr);
        assert_eq!(specs[1].data_index, 1);
        assert_eq!(specs[0].name, "Fit 1");
        assert_eq!(specs[0].options.bounds.lower, vec![0.0, f64::NEG_INFINITY]);
        assert_eq!(specs[0].options.bounds.upper, vec![f64::INFINITY]);
        assert_eq!(specs[0].plot_range, PlotRange::Pair(Endpoint::Fit, Endpoint::Cross { target: 1.5 }));
        assert_eq!(specs[0].start, vec![1.0, 0.5]);
    }

    #[test]
    fn start_defaults_to_ones() {
        let plan = FitPlan::from_json(
            r#"{ "data": { "path": "d.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 1.0] },
                 "fits": { "model": "GaussPDF" } }"#,
        )
        .unwrap();
        let specs = plan.resolve().unwrap();
        assert_eq!(specs[0].start, vec![1.0; 3]);
        assert_eq!(specs[0].options.loss_scale, 1.0);
        assert_eq!(specs[0].plot_range, PlotRange::Visible);
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        let plan = FitPlan::from_json(
            r#"{ "data": { "path": "d.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 1.0] },
                 "fits": { "model": "Nope" } }"#,
        )
        .unwrap();
        let err = plan.resolve().unwrap_err();
        assert_eq!(err.stage(), Stage::Config);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn override_beyond_count_is_rejected() {
        let plan = FitPlan::from_json(
            r#"{ "data": { "path": "d.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 1.0] },
                 "fits": { "name": { "base": null, "overrides": { "3": "late" } } } }"#,
        )
        .unwrap();
        assert!(plan.resolve().is_err());
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let plan = FitPlan::from_json(
            r#"{ "data": { "path": "d.csv", "x_columns": ["x"], "y_columns": ["y"] },
                 "render": { "x_limits": [0.0, 1.0] },
                 "fits": { "labels": { "function": "f", "params": ["A"] } } }"#,
        )
        .unwrap();
        let err = plan.resolve().unwrap_err();
        assert_eq!(err.fit(), Some("Fit 1"));
    }
}
