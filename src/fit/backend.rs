//! Regression backends behind the common `fit` contract.
//!
//! Dispatch order:
//!
//! 1. a robust loss is set → robust least squares (even for `linear`)
//! 2. `Method::Odr` → orthogonal distance regression
//! 3. otherwise → weighted least squares, bounded when any bound is finite
//!
//! All three operate on a `FitTarget`, which is the prepared series in the
//! (optionally) log-transformed domain together with the matching model
//! transform.

use tracing::{debug, warn};

use crate::domain::{FitOptions, FitOutcome, FitResult, Method, SigmaScaling, SolverDiagnostics};
use crate::error::{AppError, ErrorKind, Stage};
use crate::math::{covariance_from_jacobian, Covariance};
use crate::models::Model;

use super::odr::{fit_odr, OdrData};
use super::prepare::{log_transform, PreparedSeries};
use super::solver::minimize;

/// Regression target: data and model in the same (possibly log) domain.
#[derive(Debug, Clone)]
pub struct FitTarget {
    pub series: PreparedSeries,
    log_base: Option<f64>,
}

impl FitTarget {
    pub fn new(data: &PreparedSeries, log_base: Option<f64>) -> Result<Self, AppError> {
        let series = match log_base {
            Some(base) => log_transform(data, base)?,
            None => data.clone(),
        };
        Ok(Self { series, log_base })
    }

    pub fn log_base(&self) -> Option<f64> {
        self.log_base
    }

    /// Model value in the target domain.
    pub fn eval(&self, model: &Model, x: f64, params: &[f64]) -> f64 {
        let y = model.eval(x, params);
        match self.log_base {
            Some(base) => y.ln() / base.ln(),
            None => y,
        }
    }

    pub fn without_point(&self, idx: usize) -> Self {
        Self {
            series: self.series.without_point(idx),
            log_base: self.log_base,
        }
    }
}

/// Fit `model` to `data` starting from `start`.
pub fn fit(model: &Model, start: &[f64], data: &PreparedSeries, options: &FitOptions) -> Result<FitOutcome, AppError> {
    let target = FitTarget::new(data, options.log_base)?;
    fit_target(model, start, &target, options)
}

/// Fit on an already transformed target.
pub fn fit_target(
    model: &Model,
    start: &[f64],
    target: &FitTarget,
    options: &FitOptions,
) -> Result<FitOutcome, AppError> {
    let p = model.param_count();
    if start.len() != p {
        return Err(AppError::invalid(
            Stage::Regression,
            format!("{} expects {p} start values, got {}", model.name(), start.len()),
        ));
    }
    let n = target.series.len();
    if n < p {
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            Stage::Regression,
            format!("{n} points cannot determine {p} parameters"),
        ));
    }
    let Some((lower, upper)) = options.bounds.expand(p) else {
        return Err(AppError::invalid(
            Stage::Regression,
            format!("bounds must have 1 or {p} entries per side"),
        ));
    };
    if options.loss.is_some() && !(options.loss_scale > 0.0) {
        return Err(AppError::invalid(
            Stage::Regression,
            format!("loss scale must be positive, got {}", options.loss_scale),
        ));
    }

    let input = BackendInput {
        model,
        target,
        start,
        lower: &lower,
        upper: &upper,
        options,
    };

    if options.loss.is_some() {
        robust_least_squares(&input)
    } else if options.method == Method::Odr {
        orthogonal(&input)
    } else {
        weighted_least_squares(&input)
    }
}

struct BackendInput<'a> {
    model: &'a Model,
    target: &'a FitTarget,
    start: &'a [f64],
    lower: &'a [f64],
    upper: &'a [f64],
    options: &'a FitOptions,
}

impl BackendInput<'_> {
    /// Residuals `(f(x) − y) / σ_y` in the target domain.
    fn residuals(&self, params: &[f64]) -> Vec<f64> {
        let s = &self.target.series;
        (0..s.len())
            .map(|i| {
                let r = self.target.eval(self.model, s.x[i], params) - s.y[i];
                match &s.y_err {
                    Some(e) => r / e[i],
                    None => r,
                }
            })
            .collect()
    }

    fn bounded(&self) -> bool {
        self.lower.iter().chain(self.upper).any(|b| b.is_finite())
    }
}

fn outcome(
    params: Vec<f64>,
    covariance: Covariance,
    diagnostics: SolverDiagnostics,
) -> FitOutcome {
    if !covariance.is_full_rank() {
        warn!(
            rank = covariance.rank,
            params = params.len(),
            "covariance is rank-truncated; some parameters are not identifiable"
        );
    }
    FitOutcome {
        result: FitResult {
            errors: covariance.standard_errors(),
            covariance: Some(covariance.matrix),
            params,
        },
        diagnostics,
    }
}

fn weighted_least_squares(input: &BackendInput<'_>) -> Result<FitOutcome, AppError> {
    let options = input.options;
    let bounded = input.bounded();
    let method = match (options.method, bounded) {
        (Method::Lm, true) => {
            warn!(model = input.model.name(), "lm does not support bounds; using the bounded solver");
            Method::Trf
        }
        (Method::Lm, false) => Method::Lm,
        (other, _) => other,
    };

    let sol = minimize(
        |p: &[f64]| input.residuals(p),
        input.start,
        input.lower,
        input.upper,
        None,
        &options.solver,
    )?;

    let n = input.target.series.len();
    let p = sol.params.len();
    let absolute = match options.sigma_scaling {
        SigmaScaling::Auto => input.target.series.y_err.is_some(),
        SigmaScaling::Absolute => true,
        SigmaScaling::Relative => false,
    };

    let mut covariance = covariance_from_jacobian(&sol.jacobian)?;
    if !absolute {
        if n > p {
            covariance = covariance.scaled(2.0 * sol.cost / (n - p) as f64);
        } else {
            warn!(n, p, "no degrees of freedom left to scale the covariance");
            covariance.matrix.fill(f64::INFINITY);
        }
    }

    debug!(method = method.display_name(), absolute, "weighted least squares done");

    let diagnostics = SolverDiagnostics {
        method,
        robust: false,
        iterations: sol.iterations,
        evaluations: sol.evaluations,
        termination: sol.termination,
        cost: sol.cost,
        rank: covariance.rank,
    };
    Ok(outcome(sol.params, covariance, diagnostics))
}

fn robust_least_squares(input: &BackendInput<'_>) -> Result<FitOutcome, AppError> {
    let options = input.options;
    let loss = options.loss.map(|l| (l, options.loss_scale));
    if options.method == Method::Odr {
        warn!(model = input.model.name(), "a robust loss takes precedence over odr");
    }

    let sol = minimize(
        |p: &[f64]| input.residuals(p),
        input.start,
        input.lower,
        input.upper,
        loss,
        &options.solver,
    )?;

    // Errors from the loss-scaled Jacobian, without residual-variance scaling.
    let covariance = covariance_from_jacobian(&sol.jacobian)?;

    let diagnostics = SolverDiagnostics {
        method: Method::Trf,
        robust: true,
        iterations: sol.iterations,
        evaluations: sol.evaluations,
        termination: sol.termination,
        cost: sol.cost,
        rank: covariance.rank,
    };
    Ok(outcome(sol.params, covariance, diagnostics))
}

fn orthogonal(input: &BackendInput<'_>) -> Result<FitOutcome, AppError> {
    let s = &input.target.series;
    let data = OdrData::new(&s.x, &s.y, s.x_err.as_deref(), s.y_err.as_deref());
    if input.bounded() {
        debug!("odr bounds are enforced by projecting β after each step");
    }

    let sol = fit_odr(
        |x: f64, p: &[f64]| input.target.eval(input.model, x, p),
        &data,
        input.start,
        input.lower,
        input.upper,
        input.options.odr_job,
        &input.options.solver,
    )?;

    let diagnostics = SolverDiagnostics {
        method: Method::Odr,
        robust: false,
        iterations: sol.iterations,
        evaluations: sol.evaluations,
        termination: sol.termination,
        cost: 0.5 * sol.sum_squares,
        rank: sol.covariance.rank,
    };
    Ok(outcome(sol.beta, sol.covariance, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bounds, Interval, OdrJob, RobustLoss};
    use crate::models::lookup;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn series(x: Vec<f64>, y: Vec<f64>, y_err: Option<Vec<f64>>) -> PreparedSeries {
        let interval = Interval::new(x[0], x[x.len() - 1]);
        PreparedSeries {
            x,
            y,
            x_err: None,
            y_err,
            interval,
            excluded: None,
        }
    }

    fn noisy_line(sigma: f64, seed: u64) -> PreparedSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, sigma).unwrap();
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x + 1.0 + noise.sample(&mut rng)).collect();
        series(x, y, Some(vec![sigma; 40]))
    }

    #[test]
    fn weighted_linear_recovers_parameters_and_errors_shrink_with_sigma() {
        let model = lookup("Linear").unwrap();
        let options = FitOptions::default();

        let wide = fit(&model, &[1.0, 0.0], &noisy_line(0.5, 7), &options).unwrap();
        let narrow = fit(&model, &[1.0, 0.0], &noisy_line(0.05, 7), &options).unwrap();

        assert!((wide.result.params[0] - 2.0).abs() < 4.0 * wide.result.errors[0]);
        assert!((wide.result.params[1] - 1.0).abs() < 4.0 * wide.result.errors[1]);
        assert!((narrow.result.params[0] - 2.0).abs() < 4.0 * narrow.result.errors[0]);
        for k in 0..2 {
            assert!(narrow.result.errors[k] < wide.result.errors[k] / 5.0);
        }
        assert_eq!(narrow.diagnostics.method, Method::Lm);
    }

    #[test]
    fn absolute_errors_match_closed_form_for_a_line() {
        let data = noisy_line(0.2, 3);
        let model = lookup("Linear").unwrap();
        let out = fit(&model, &[1.0, 0.0], &data, &FitOptions::default()).unwrap();

        // (XᵗWX)⁻¹ with W = 1/σ²
        let w = 1.0 / (0.2f64 + 1e-10).powi(2);
        let s0 = w * data.x.len() as f64;
        let s1: f64 = data.x.iter().map(|x| w * x).sum();
        let s2: f64 = data.x.iter().map(|x| w * x * x).sum();
        let det = s0 * s2 - s1 * s1;
        assert!((out.result.errors[0] - (s0 / det).sqrt()).abs() / (s0 / det).sqrt() < 1e-5);
        assert!((out.result.errors[1] - (s2 / det).sqrt()).abs() / (s2 / det).sqrt() < 1e-5);
    }

    #[test]
    fn log_fit_of_exponential_matches_linear_fit_of_log_data() {
        let x: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, x)| 3.0 * (0.4 * x).exp() * (1.0 + 0.02 * if i % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        let data = series(x.clone(), y.clone(), None);

        let options = FitOptions {
            log_base: Some(std::f64::consts::E),
            ..FitOptions::default()
        };
        let exp = fit(&lookup("ExpFit").unwrap(), &[1.0, 0.1], &data, &options).unwrap();

        let ln_y: Vec<f64> = y.iter().map(|v| v.ln()).collect();
        let line = fit(&lookup("Linear").unwrap(), &[0.1, 0.0], &series(x, ln_y, None), &FitOptions::default()).unwrap();

        // ln(A·e^{kx}) = k·x + ln A
        assert!((exp.result.params[1] - line.result.params[0]).abs() < 1e-6);
        assert!((exp.result.params[0].ln() - line.result.params[1]).abs() < 1e-6);
        assert!((exp.result.errors[1] - line.result.errors[0]).abs() < 1e-5);
    }

    #[test]
    fn lm_with_bounds_switches_to_bounded_solver() {
        let model = lookup("Linear").unwrap();
        let options = FitOptions {
            bounds: Bounds::new(vec![0.0, 0.0], vec![1.5, 10.0]),
            ..FitOptions::default()
        };
        let out = fit(&model, &[1.0, 0.0], &noisy_line(0.05, 11), &options).unwrap();
        assert_eq!(out.diagnostics.method, Method::Trf);
        assert!(out.result.params[0] <= 1.5);
    }

    #[test]
    fn robust_loss_routes_to_robust_backend() {
        let mut data = noisy_line(0.05, 5);
        data.y[20] += 30.0;
        let model = lookup("Linear").unwrap();
        let options = FitOptions {
            loss: Some(RobustLoss::SoftL1),
            method: Method::Odr,
            ..FitOptions::default()
        };
        let out = fit(&model, &[1.0, 0.0], &data, &options).unwrap();
        assert!(out.diagnostics.robust);
        assert!((out.result.params[0] - 2.0).abs() < 0.05);
        assert!(out.result.errors.iter().all(|e| e.is_finite()));
    }

    #[test]
    fn odr_backend_reports_scaled_covariance() {
        let model = lookup("Linear").unwrap();
        let options = FitOptions {
            method: Method::Odr,
            odr_job: OdrJob::Explicit,
            ..FitOptions::default()
        };
        let out = fit(&model, &[1.0, 0.0], &noisy_line(0.1, 2), &options).unwrap();
        assert_eq!(out.diagnostics.method, Method::Odr);
        let cov = out.result.covariance.unwrap();
        assert!((cov[(0, 0)].sqrt() - out.result.errors[0]).abs() < 1e-15);
    }

    #[test]
    fn zero_degrees_of_freedom_give_infinite_errors_for_odr_and_wls() {
        let model = lookup("Linear").unwrap();
        let data = series(vec![0.0, 1.0], vec![1.0, 3.5], None);
        let wls = FitOptions {
            sigma_scaling: SigmaScaling::Relative,
            ..FitOptions::default()
        };
        let odr = FitOptions {
            method: Method::Odr,
            ..FitOptions::default()
        };

        let wls = fit(&model, &[1.0, 0.0], &data, &wls).unwrap();
        let odr = fit(&model, &[1.0, 0.0], &data, &odr).unwrap();
        assert!(wls.result.errors.iter().all(|e| *e == f64::INFINITY));
        assert!(odr.result.errors.iter().all(|e| *e == f64::INFINITY), "{:?}", odr.result.errors);
        assert!(crate::report::format_value_error(odr.result.params[0], odr.result.errors[0]).ends_with("(inf)"));
    }

    #[test]
    fn bounded_method_names_share_the_projected_solver() {
        let model = lookup("Linear").unwrap();
        let data = noisy_line(0.05, 3);
        let lm = fit(&model, &[1.0, 0.0], &data, &FitOptions::default()).unwrap();
        for method in [Method::Trf, Method::Dogbox] {
            let options = FitOptions {
                method,
                ..FitOptions::default()
            };
            let out = fit(&model, &[1.0, 0.0], &data, &options).unwrap();
            assert_eq!(out.diagnostics.method, method);
            assert_eq!(out.result.params, lm.result.params);
        }
    }

    #[test]
    fn start_length_and_point_count_are_checked() {
        let model = lookup("Quadratic").unwrap();
        let data = series(vec![0.0, 1.0], vec![1.0, 2.0], None);
        let err = fit(&model, &[1.0, 0.0], &data, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = fit(&model, &[1.0, 0.0, 0.0], &data, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }
}
