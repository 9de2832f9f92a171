//! Goodness-of-fit statistics.
//!
//! Everything is computed in the target domain of the fit, so a log-space fit
//! reports RMSE, R² and χ² of the log-transformed values.

use crate::domain::GoodnessOfFit;
use crate::fit::FitTarget;
use crate::models::Model;

/// Evaluate fit quality of `params` against `target`.
///
/// Degenerate statistics come back as `None` instead of NaN/∞:
///
/// - adjusted R² needs `n − p − 1 > 0`
/// - χ² needs y-uncertainties
/// - reduced χ² additionally needs `n − p > 0`
pub fn goodness_of_fit(model: &Model, target: &FitTarget, params: &[f64]) -> GoodnessOfFit {
    let s = &target.series;
    let n = s.len();
    let p = params.len();

    let raw: Vec<f64> = (0..n).map(|i| target.eval(model, s.x[i], params) - s.y[i]).collect();

    let ss_res: f64 = raw.iter().map(|r| r * r).sum();
    let rmse = if n > 0 { (ss_res / n as f64).sqrt() } else { f64::NAN };
    let r_squared = r_squared(&s.y, ss_res);

    let adj_r_squared = if n as isize - p as isize - 1 > 0 {
        Some(1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / (n - p - 1) as f64)
    } else {
        None
    };

    let (residuals, residuals_normalized) = match &s.y_err {
        Some(e) => (raw.iter().zip(e).map(|(r, e)| r / e).collect::<Vec<_>>(), true),
        None => (raw, false),
    };

    let chi_squared = residuals_normalized.then(|| residuals.iter().map(|r| r * r).sum::<f64>());
    let reduced_chi_squared = chi_squared.filter(|_| n > p).map(|chi2| chi2 / (n - p) as f64);

    GoodnessOfFit {
        n,
        n_params: p,
        rmse,
        r_squared,
        adj_r_squared,
        chi_squared,
        reduced_chi_squared,
        cross_validation: None,
        residuals,
        residuals_normalized,
    }
}

/// Coefficient of determination `1 − SS_res/SS_tot`.
///
/// A constant target gives 1 for a perfect fit and 0 otherwise.
pub fn r_squared(y: &[f64], ss_res: f64) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
