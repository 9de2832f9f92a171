//! Series preprocessing.
//!
//! Turns one raw `Series` of a `DataSet` into aligned regression arrays:
//!
//! - points with NaN `y` are dropped from every aligned vector together
//! - the fit interval defaults to `[min(x), max(x)]`
//! - a point is kept iff `lo ≤ x ≤ hi` and it lies outside the open excluded
//!   interval (`x ≤ eLo` or `x ≥ eHi`)
//! - a scalar uncertainty of `0` means "absent", other scalars are broadcast
//! - a floor of `1e-10` is added to every present uncertainty value
//!
//! The log transform used by the log-space fits lives here as well, so the
//! regression, goodness-of-fit and cross-validation all see the same target.

use tracing::debug;

use crate::domain::{DataSet, Interval, Series, Uncertainty, UNCERTAINTY_FLOOR};
use crate::error::{AppError, ErrorKind, Stage};

/// Aligned arrays ready for regression.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub x_err: Option<Vec<f64>>,
    pub y_err: Option<Vec<f64>>,
    /// Resolved fit interval.
    pub interval: Interval,
    pub excluded: Option<Interval>,
}

impl PreparedSeries {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Copy with point `idx` removed from every aligned vector.
    pub fn without_point(&self, idx: usize) -> Self {
        let drop = |v: &[f64]| -> Vec<f64> {
            v.iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, v)| *v)
                .collect()
        };
        Self {
            x: drop(&self.x),
            y: drop(&self.y),
            x_err: self.x_err.as_deref().map(drop),
            y_err: self.y_err.as_deref().map(drop),
            interval: self.interval,
            excluded: self.excluded,
        }
    }
}

/// Select series `index` from `data` and apply the interval masks.
pub fn prepare_series(
    data: &DataSet,
    index: usize,
    interval: Option<Interval>,
    excluded: Option<Interval>,
) -> Result<PreparedSeries, AppError> {
    let series = data.series.get(index).ok_or_else(|| {
        AppError::invalid(
            Stage::Preprocessing,
            format!("data index {index} is out of range ({} series available)", data.series.len()),
        )
    })?;
    prepare(series, interval, excluded)
}

/// Apply the preprocessing rules to a single series.
pub fn prepare(
    series: &Series,
    interval: Option<Interval>,
    excluded: Option<Interval>,
) -> Result<PreparedSeries, AppError> {
    let n = series.x.len();
    if series.y.len() != n {
        return Err(AppError::invalid(
            Stage::Preprocessing,
            format!("x has {n} values but y has {}", series.y.len()),
        ));
    }
    check_uncertainty_len(&series.x_err, n, "x")?;
    check_uncertainty_len(&series.y_err, n, "y")?;

    // Rule (a): NaN y removes the point everywhere.
    let defined: Vec<usize> = (0..n).filter(|&i| !series.y[i].is_nan()).collect();

    // Rule (b): default interval over the defined points.
    let interval = match interval {
        Some(iv) => iv,
        None => {
            let (lo, hi) = defined
                .iter()
                .map(|&i| series.x[i])
                .filter(|x| !x.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
            Interval::new(lo, hi)
        }
    };

    // Rule (c): interval and exclusion mask.
    let keep: Vec<usize> = defined
        .into_iter()
        .filter(|&i| {
            let x = series.x[i];
            interval.contains(x) && excluded.is_none_or(|ex| x <= ex.lo || x >= ex.hi)
        })
        .collect();

    if keep.is_empty() {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            Stage::Preprocessing,
            format!("no points left in [{}, {}] after masking", interval.lo, interval.hi),
        ));
    }

    let x: Vec<f64> = keep.iter().map(|&i| series.x[i]).collect();
    let y: Vec<f64> = keep.iter().map(|&i| series.y[i]).collect();

    debug!(total = n, kept = x.len(), lo = interval.lo, hi = interval.hi, "series prepared");

    Ok(PreparedSeries {
        x_err: align_uncertainty(&series.x_err, &keep),
        y_err: align_uncertainty(&series.y_err, &keep),
        x,
        y,
        interval,
        excluded,
    })
}

fn check_uncertainty_len(err: &Uncertainty, n: usize, axis: &str) -> Result<(), AppError> {
    if let Uncertainty::PerPoint(values) = err {
        if values.len() != n {
            return Err(AppError::invalid(
                Stage::Preprocessing,
                format!("{axis} uncertainty has {} values but the series has {n}", values.len()),
            ));
        }
    }
    Ok(())
}

// Rules (d) and (e).
fn align_uncertainty(err: &Uncertainty, keep: &[usize]) -> Option<Vec<f64>> {
    match err {
        Uncertainty::Absent => None,
        Uncertainty::Scalar(s) if *s == 0.0 => None,
        Uncertainty::Scalar(s) => Some(vec![s + UNCERTAINTY_FLOOR; keep.len()]),
        Uncertainty::PerPoint(values) => Some(keep.iter().map(|&i| values[i] + UNCERTAINTY_FLOOR).collect()),
    }
}

/// Map a prepared series into `log_base` space.
///
/// Points with `y == 0` are removed first; a negative `y` is an input error.
/// The y-uncertainty propagates as the relative error `σ/|y|` for every base;
/// an absent uncertainty stays absent.
pub fn log_transform(series: &PreparedSeries, base: f64) -> Result<PreparedSeries, AppError> {
    if !(base > 0.0 && base != 1.0 && base.is_finite()) {
        return Err(AppError::invalid(Stage::Preprocessing, format!("invalid log base {base}")));
    }
    if let Some(y) = series.y.iter().find(|y| **y < 0.0) {
        return Err(AppError::invalid(
            Stage::Preprocessing,
            format!("log fit requires non-negative y values, found {y}"),
        ));
    }

    let keep: Vec<usize> = (0..series.len()).filter(|&i| series.y[i] != 0.0).collect();
    if keep.is_empty() {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            Stage::Preprocessing,
            "no non-zero y values left for the log fit",
        ));
    }

    let ln_base = base.ln();
    let pick = |v: &[f64]| -> Vec<f64> { keep.iter().map(|&i| v[i]).collect() };
    let y_raw = pick(&series.y);

    Ok(PreparedSeries {
        x: pick(&series.x),
        y: y_raw.iter().map(|y| y.ln() / ln_base).collect(),
        x_err: series.x_err.as_deref().map(pick),
        y_err: series
            .y_err
            .as_deref()
            .map(|e| pick(e).iter().zip(&y_raw).map(|(e, y)| e / y.abs()).collect()),
        interval: series.interval,
        excluded: series.excluded,
    })
}
