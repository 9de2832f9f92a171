//! Orthogonal distance regression.
//!
//! Explicit ODR minimises over `(β, δ)`
//!
//! ```text
//! S = ½ Σ [ w_y,i² · (f(x_i + δ_i; β) − y_i)²  +  w_x,i² · δ_i² ]
//! ```
//!
//! The Jacobian of the stacked residuals has the block form
//!
//! ```text
//! [ J_β   D_f ]
//! [  0    D_x ]
//! ```
//!
//! with diagonal `D_f` and `D_x`, so each damped step eliminates `δ` through a
//! `p × p` Schur complement and costs `O(n·p²)` instead of `O((n+p)³)`.
//!
//! - `Implicit` drives `f(x + δ; β) − y` to zero with an increasing penalty
//!   weight while minimising the δ term.
//! - `OrdinaryLeastSquares` holds `δ = 0`.
//!
//! Standard errors follow ODRPACK: `sqrt(diag(cov_β) · res_var)` with
//! `res_var = Σ residual² / (n − p)`. Without degrees of freedom the
//! covariance is infinite.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::domain::{OdrJob, SolverSettings, Termination};
use crate::error::{AppError, ErrorKind, Stage};
use crate::math::{covariance_from_jacobian, solve_least_squares, Covariance};

/// Penalty weights of the implicit job, applied in order.
const IMPLICIT_PENALTIES: [f64; 8] = [1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8];

/// Observations of an ODR problem with per-point weights `1/σ`.
pub struct OdrData<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub weight_x: Vec<f64>,
    pub weight_y: Vec<f64>,
}

impl<'a> OdrData<'a> {
    /// Absent uncertainties act as unit weights.
    pub fn new(x: &'a [f64], y: &'a [f64], x_err: Option<&[f64]>, y_err: Option<&[f64]>) -> Self {
        let weights = |err: Option<&[f64]>| match err {
            Some(e) => e.iter().map(|s| 1.0 / s).collect(),
            None => vec![1.0; x.len()],
        };
        Self {
            x,
            y,
            weight_x: weights(x_err),
            weight_y: weights(y_err),
        }
    }
}

/// Result of an ODR run.
#[derive(Debug, Clone)]
pub struct OdrSolution {
    pub beta: Vec<f64>,
    pub delta: Vec<f64>,
    /// Scaled covariance `cov_β · res_var`.
    pub covariance: Covariance,
    pub errors: Vec<f64>,
    pub res_var: f64,
    /// Sum of squared weighted residuals (both blocks).
    pub sum_squares: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

struct State {
    beta: Vec<f64>,
    delta: Vec<f64>,
    r_y: Vec<f64>,
    r_x: Vec<f64>,
    cost: f64,
}

/// Partial derivatives at the current state.
struct Derivatives {
    /// `w_y · ∂f/∂β`, `n × p`.
    j_beta: DMatrix<f64>,
    /// `w_y · ∂f/∂x`.
    d_f: Vec<f64>,
}

/// Fit `f(x; β)` by orthogonal distance regression.
pub fn fit_odr<F>(
    f: F,
    data: &OdrData<'_>,
    start: &[f64],
    lower: &[f64],
    upper: &[f64],
    job: OdrJob,
    settings: &SolverSettings,
) -> Result<OdrSolution, AppError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = data.x.len();
    let p = start.len();

    let mut beta = super::solver::clamp_start(start, lower, upper)?;
    let mut delta = vec![0.0; n];
    let mut iterations = 0;
    let mut evaluations = 0;
    let mut termination = Termination::CostTolerance;

    let penalties: &[f64] = match job {
        OdrJob::Implicit => &IMPLICIT_PENALTIES,
        OdrJob::Explicit | OdrJob::OrdinaryLeastSquares => &[1.0],
    };
    let fix_delta = job == OdrJob::OrdinaryLeastSquares;

    let mut weights = Weights {
        wx: data.weight_x.clone(),
        wy: data.weight_y.clone(),
    };
    for &penalty in penalties {
        if job == OdrJob::Implicit {
            weights.wy = data.weight_y.iter().map(|w| w * penalty.sqrt()).collect();
        }
        let run = structured_lm(&f, data, &weights, beta, delta, lower, upper, fix_delta, settings)?;
        beta = run.state.beta;
        delta = run.state.delta;
        iterations += run.iterations;
        evaluations += run.evaluations;
        termination = run.termination;
    }

    let state = evaluate(&f, data, &weights, beta, delta);
    evaluations += 1;
    let derivs = derivatives(&f, data, &weights, &state, fix_delta);
    evaluations += p + 1;

    // Eliminating δ leaves J̃ᵗJ̃ with rows of J_β scaled by sqrt(w_x² / (d_f² + w_x²)).
    let mut reduced = derivs.j_beta.clone();
    if !fix_delta {
        for i in 0..n {
            let wx2 = weights.wx[i] * weights.wx[i];
            let denom = derivs.d_f[i] * derivs.d_f[i] + wx2;
            reduced.row_mut(i).scale_mut((wx2 / denom).sqrt());
        }
    }

    let sum_squares = 2.0 * state.cost;
    let mut covariance = covariance_from_jacobian(&reduced)?;
    let res_var = if n > p {
        sum_squares / (n - p) as f64
    } else {
        f64::INFINITY
    };
    if res_var.is_finite() {
        covariance = covariance.scaled(res_var);
    } else {
        warn!(n, p, "no degrees of freedom left to scale the covariance");
        covariance.matrix.fill(f64::INFINITY);
    }
    let errors = covariance.standard_errors();

    debug!(?job, iterations, evaluations, res_var, "orthogonal distance regression finished");

    Ok(OdrSolution {
        beta: state.beta,
        delta: state.delta,
        covariance,
        errors,
        res_var,
        sum_squares,
        iterations,
        evaluations,
        termination,
    })
}

struct Weights {
    wx: Vec<f64>,
    wy: Vec<f64>,
}

struct Run {
    state: State,
    iterations: usize,
    evaluations: usize,
    termination: Termination,
}

fn evaluate<F>(f: &F, data: &OdrData<'_>, weights: &Weights, beta: Vec<f64>, delta: Vec<f64>) -> State
where
    F: Fn(f64, &[f64]) -> f64,
{
    let r_y: Vec<f64> = (0..data.x.len())
        .map(|i| weights.wy[i] * (f(data.x[i] + delta[i], &beta) - data.y[i]))
        .collect();
    let r_x: Vec<f64> = delta.iter().zip(&weights.wx).map(|(d, w)| w * d).collect();
    let cost = 0.5 * (r_y.iter().map(|v| v * v).sum::<f64>() + r_x.iter().map(|v| v * v).sum::<f64>());
    State {
        beta,
        delta,
        r_y,
        r_x,
        cost,
    }
}

fn derivatives<F>(f: &F, data: &OdrData<'_>, weights: &Weights, state: &State, fix_delta: bool) -> Derivatives
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = data.x.len();
    let p = state.beta.len();
    let base: Vec<f64> = (0..n).map(|i| f(data.x[i] + state.delta[i], &state.beta)).collect();

    let mut j_beta = DMatrix::zeros(n, p);
    let mut probe = state.beta.clone();
    for j in 0..p {
        let h = f64::EPSILON.sqrt() * state.beta[j].abs().max(1.0);
        probe[j] = state.beta[j] + h;
        for i in 0..n {
            let xi = data.x[i] + state.delta[i];
            j_beta[(i, j)] = weights.wy[i] * (f(xi, &probe) - base[i]) / h;
        }
        probe[j] = state.beta[j];
    }

    let d_f = if fix_delta {
        vec![0.0; n]
    } else {
        (0..n)
            .map(|i| {
                let xi = data.x[i] + state.delta[i];
                let h = f64::EPSILON.sqrt() * xi.abs().max(1.0);
                weights.wy[i] * (f(xi + h, &state.beta) - base[i]) / h
            })
            .collect()
    };

    Derivatives { j_beta, d_f }
}

#[allow(clippy::too_many_arguments)]
fn structured_lm<F>(
    f: &F,
    data: &OdrData<'_>,
    weights: &Weights,
    beta: Vec<f64>,
    delta: Vec<f64>,
    lower: &[f64],
    upper: &[f64],
    fix_delta: bool,
    settings: &SolverSettings,
) -> Result<Run, AppError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = data.x.len();
    let p = beta.len();

    let mut state = evaluate(f, data, weights, beta, delta);
    let mut evaluations = 1;
    if !state.cost.is_finite() {
        return Err(AppError::new(
            ErrorKind::NotConverged,
            Stage::Regression,
            "residuals are not finite at the start point",
        ));
    }

    let mut damping = settings.initial_damping;
    let mut iterations = 0;

    let termination = loop {
        if state.cost == 0.0 {
            break Termination::ExactFit;
        }
        if iterations >= settings.max_iterations {
            return Err(AppError::new(
                ErrorKind::NotConverged,
                Stage::Regression,
                format!("orthogonal distance regression did not converge within {} iterations", settings.max_iterations),
            ));
        }
        iterations += 1;

        let derivs = derivatives(f, data, weights, &state, fix_delta);
        evaluations += p + 1 + usize::from(!fix_delta);

        let r_y = DVector::from_column_slice(&state.r_y);
        let g_beta = derivs.j_beta.transpose() * &r_y;
        let g_delta: Vec<f64> = (0..n)
            .map(|i| derivs.d_f[i] * state.r_y[i] + weights.wx[i] * state.r_x[i])
            .collect();

        let g_delta_max = g_delta.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
        if g_beta.amax().max(g_delta_max) <= settings.gtol * state.cost {
            break Termination::GradientTolerance;
        }

        let Some((step_beta, step_delta)) =
            schur_step(&derivs, weights, &g_beta, &g_delta, damping, fix_delta)
        else {
            return Err(AppError::new(
                ErrorKind::SingularJacobian,
                Stage::Regression,
                "reduced normal equations could not be solved",
            ));
        };

        let mut beta_trial: Vec<f64> = state.beta.iter().zip(step_beta.iter()).map(|(b, s)| b + s).collect();
        for ((v, lo), hi) in beta_trial.iter_mut().zip(lower).zip(upper) {
            *v = v.clamp(*lo, *hi);
        }
        let delta_trial: Vec<f64> = state.delta.iter().zip(&step_delta).map(|(d, s)| d + s).collect();

        let step_norm = beta_trial
            .iter()
            .zip(&state.beta)
            .map(|(a, b)| (a - b).powi(2))
            .chain(step_delta.iter().map(|d| d * d))
            .sum::<f64>()
            .sqrt();
        let x_norm = state
            .beta
            .iter()
            .chain(&state.delta)
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();

        let trial = evaluate(f, data, weights, beta_trial, delta_trial);
        evaluations += 1;

        if trial.cost.is_finite() && trial.cost < state.cost {
            let reduction = state.cost - trial.cost;
            let previous = state.cost;
            state = trial;
            damping = (damping / 10.0).max(1e-15);
            if reduction <= settings.ftol * previous {
                break Termination::CostTolerance;
            }
            if step_norm <= settings.xtol * (settings.xtol + x_norm) {
                break Termination::StepTolerance;
            }
        } else {
            damping *= 10.0;
            if damping > 1e32 {
                break Termination::StepTolerance;
            }
        }
    };

    Ok(Run {
        state,
        iterations,
        evaluations,
        termination,
    })
}

/// Damped step `(Δβ, Δδ)` from the block normal equations.
///
/// ```text
/// (A + λ·diag(A) − B·E⁻¹·Bᵗ) Δβ = −g_β + B·E⁻¹·g_δ
/// Δδ_i = (−g_δ,i − d_f,i · (J_β Δβ)_i) / E_i
/// ```
///
/// with `A = J_βᵗJ_β`, `B = J_βᵗD_f`, `E_i = (d_f,i² + w_x,i²)(1 + λ)`.
fn schur_step(
    derivs: &Derivatives,
    weights: &Weights,
    g_beta: &DVector<f64>,
    g_delta: &[f64],
    damping: f64,
    fix_delta: bool,
) -> Option<(DVector<f64>, Vec<f64>)> {
    let n = derivs.d_f.len();
    let p = derivs.j_beta.ncols();

    let a = derivs.j_beta.transpose() * &derivs.j_beta;
    let mut lhs = a.clone();
    for j in 0..p {
        lhs[(j, j)] += damping * a[(j, j)].max(f64::EPSILON);
    }
    let mut rhs = -g_beta;

    if fix_delta {
        let step = solve_least_squares(&lhs, &rhs)?;
        return Some((step, vec![0.0; n]));
    }

    let e: Vec<f64> = (0..n)
        .map(|i| (derivs.d_f[i].powi(2) + weights.wx[i].powi(2)) * (1.0 + damping))
        .collect();

    for i in 0..n {
        let row = derivs.j_beta.row(i);
        let coef = derivs.d_f[i] / e[i];
        // B·E⁻¹·Bᵗ and B·E⁻¹·g_δ, one observation at a time.
        for a_idx in 0..p {
            rhs[a_idx] += row[a_idx] * coef * g_delta[i];
            for b_idx in 0..p {
                lhs[(a_idx, b_idx)] -= row[a_idx] * row[b_idx] * coef * derivs.d_f[i];
            }
        }
    }

    let step_beta = solve_least_squares(&lhs, &rhs)?;
    let j_step = &derivs.j_beta * &step_beta;
    let step_delta = (0..n)
        .map(|i| (-g_delta[i] - derivs.d_f[i] * j_step[i]) / e[i])
        .collect();
    Some((step_beta, step_delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded(n: usize) -> (Vec<f64>, Vec<f64>) {
        (vec![f64::NEG_INFINITY; n], vec![f64::INFINITY; n])
    }

    fn line(x: f64, b: &[f64]) -> f64 {
        b[0] * x + b[1]
    }

    #[test]
    fn explicit_recovers_line_from_exact_data() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 1.5 * x - 2.0).collect();
        let data = OdrData::new(&x, &y, None, None);
        let (lo, hi) = unbounded(2);

        let sol = fit_odr(line, &data, &[1.0, 0.0], &lo, &hi, OdrJob::Explicit, &SolverSettings::default()).unwrap();
        assert!((sol.beta[0] - 1.5).abs() < 1e-6, "{:?}", sol.beta);
        assert!((sol.beta[1] + 2.0).abs() < 1e-6);
        assert!(sol.delta.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn two_points_leave_errors_unbounded() {
        let x = vec![0.0, 1.0];
        let y = vec![1.0, 3.5];
        let data = OdrData::new(&x, &y, None, None);
        let (lo, hi) = unbounded(2);

        let sol = fit_odr(line, &data, &[1.0, 0.0], &lo, &hi, OdrJob::Explicit, &SolverSettings::default()).unwrap();
        assert!((sol.beta[0] - 2.5).abs() < 1e-4, "{:?}", sol.beta);
        assert_eq!(sol.res_var, f64::INFINITY);
        assert!(sol.errors.iter().all(|e| *e == f64::INFINITY), "{:?}", sol.errors);
    }

    #[test]
    fn explicit_slope_matches_deming_regression() {
        // With unit weights on both axes the explicit fit of a line is the
        // Deming regression with variance ratio 1.
        let x = vec![0.0, 1.0, 1.0, 2.0, 2.0, 3.0];
        let y = vec![0.0, 1.5, 0.5, 2.5, 1.5, 3.0];
        let data = OdrData::new(&x, &y, None, None);
        let (lo, hi) = unbounded(2);

        let odr = fit_odr(line, &data, &[0.5, 0.0], &lo, &hi, OdrJob::Explicit, &SolverSettings::default()).unwrap();
        let ols =
            fit_odr(line, &data, &[0.5, 0.0], &lo, &hi, OdrJob::OrdinaryLeastSquares, &SolverSettings::default())
                .unwrap();
        assert!(ols.delta.iter().all(|d| *d == 0.0));
        assert!((ols.beta[0] - 1.0).abs() < 1e-8);

        // sxx = sxy = 5.5, syy = 6.5
        let deming = (1.0 + 122f64.sqrt()) / 11.0;
        assert!((odr.beta[0] - deming).abs() < 1e-4, "{:?}", odr.beta);
        assert!(odr.errors.iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn ols_job_matches_linear_regression() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = vec![0.1, 0.9, 2.1, 2.9, 4.2];
        let data = OdrData::new(&x, &y, None, None);
        let (lo, hi) = unbounded(2);
        let sol =
            fit_odr(line, &data, &[1.0, 0.0], &lo, &hi, OdrJob::OrdinaryLeastSquares, &SolverSettings::default())
                .unwrap();

        let n = x.len() as f64;
        let mx = x.iter().sum::<f64>() / n;
        let my = y.iter().sum::<f64>() / n;
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - mx) * (b - my)).sum();
        let sxx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
        assert!((sol.beta[0] - sxy / sxx).abs() < 1e-8);
        assert!((sol.beta[1] - (my - sxy / sxx * mx)).abs() < 1e-8);
    }

    #[test]
    fn implicit_job_moves_x_onto_the_curve() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![0.2, 1.9, 4.1, 6.0, 8.2, 9.9];
        let data = OdrData::new(&x, &y, None, None);
        let (lo, hi) = unbounded(2);
        let sol = fit_odr(line, &data, &[2.0, 0.0], &lo, &hi, OdrJob::Implicit, &SolverSettings::default()).unwrap();
        for i in 0..x.len() {
            let gap = line(x[i] + sol.delta[i], &sol.beta) - y[i];
            assert!(gap.abs() < 1e-3, "gap {gap} at {i}");
        }
    }
}
