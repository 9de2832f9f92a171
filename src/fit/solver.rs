//! Nonlinear least squares core.
//!
//! A damped Gauss–Newton (Levenberg–Marquardt) solver over a residual closure
//! `r(p)`. Each step solves the augmented system from `math::lstsq`; the
//! damping is updated from the ratio of actual to predicted cost reduction.
//!
//! Two extensions are folded into the same loop:
//!
//! - **Box bounds**: steps are projected into `[lower, upper]` and the gradient
//!   test ignores components pushing against an active bound.
//! - **Robust loss**: each iteration rescales residuals and Jacobian rows so
//!   that `JᵗJ` is the Gauss–Newton Hessian of `½ Σ C²·ρ((r/C)²)`.
//!
//! The Jacobian is built by forward differences with step
//! `sqrt(eps)·max(|p|, 1)`, flipped to a backward step at an upper bound.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{RobustLoss, SolverSettings, Termination};
use crate::error::{AppError, ErrorKind, Stage};
use crate::math::{solve_least_squares, vstack};

const DAMPING_CEILING: f64 = 1e32;

/// Converged state of a least squares run.
#[derive(Debug, Clone)]
pub struct Solution {
    pub params: Vec<f64>,
    /// Raw residuals `r(p)` at the solution.
    pub residuals: Vec<f64>,
    /// Jacobian at the solution, rescaled by the robust loss when one is set.
    pub jacobian: DMatrix<f64>,
    /// `½ Σ C²·ρ((r/C)²)`; equals `½ Σ r²` without a loss.
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Robust loss `ρ(z)` with its first two derivatives.
pub fn loss_kernel(loss: RobustLoss, z: f64) -> [f64; 3] {
    match loss {
        RobustLoss::Linear => [z, 1.0, 0.0],
        RobustLoss::SoftL1 => {
            let t = 1.0 + z;
            [2.0 * (t.sqrt() - 1.0), t.powf(-0.5), -0.5 * t.powf(-1.5)]
        }
        RobustLoss::Huber => {
            if z <= 1.0 {
                [z, 1.0, 0.0]
            } else {
                [2.0 * z.sqrt() - 1.0, z.powf(-0.5), -0.5 * z.powf(-1.5)]
            }
        }
        RobustLoss::Cauchy => {
            let t = 1.0 + z;
            [t.ln(), 1.0 / t, -1.0 / (t * t)]
        }
        RobustLoss::Arctan => {
            let t = 1.0 + z * z;
            [z.atan(), 1.0 / t, -2.0 * z / (t * t)]
        }
    }
}

/// Loss applied to a residual vector: the cost and the scaled `(r, J)`.
struct Scaled {
    cost: f64,
    residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
}

fn scale_for_loss(loss: Option<(RobustLoss, f64)>, r: &[f64], jac: DMatrix<f64>) -> Scaled {
    let Some((loss, c)) = loss else {
        return Scaled {
            cost: 0.5 * r.iter().map(|v| v * v).sum::<f64>(),
            residuals: DVector::from_column_slice(r),
            jacobian: jac,
        };
    };

    let mut jac = jac;
    let mut residuals = DVector::zeros(r.len());
    let mut cost = 0.0;
    for (i, &ri) in r.iter().enumerate() {
        let z = (ri / c).powi(2);
        let [rho0, rho1, rho2] = loss_kernel(loss, z);
        cost += 0.5 * c * c * rho0;
        let j_scale = (rho1 + 2.0 * rho2 * z).max(f64::EPSILON).sqrt();
        jac.row_mut(i).scale_mut(j_scale);
        residuals[i] = ri * rho1 / j_scale;
    }
    Scaled {
        cost,
        residuals,
        jacobian: jac,
    }
}

fn loss_cost(loss: Option<(RobustLoss, f64)>, r: &[f64]) -> f64 {
    match loss {
        None => 0.5 * r.iter().map(|v| v * v).sum::<f64>(),
        Some((loss, c)) => r
            .iter()
            .map(|ri| 0.5 * c * c * loss_kernel(loss, (ri / c).powi(2))[0])
            .sum(),
    }
}

/// Forward-difference Jacobian of `f` at `p`.
pub fn numeric_jacobian<F>(f: &F, p: &[f64], r0: &[f64], upper: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = r0.len();
    let mut jac = DMatrix::zeros(n, p.len());
    let mut probe = p.to_vec();
    for j in 0..p.len() {
        let mut h = f64::EPSILON.sqrt() * p[j].abs().max(1.0);
        if p[j] + h > upper[j] {
            h = -h;
        }
        probe[j] = p[j] + h;
        let r1 = f(&probe);
        for i in 0..n {
            jac[(i, j)] = (r1[i] - r0[i]) / h;
        }
        probe[j] = p[j];
    }
    jac
}

fn project(p: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, lo), hi) in p.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(*lo, *hi);
    }
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Check and expand the box, returning the start vector clamped into it.
pub fn clamp_start(start: &[f64], lower: &[f64], upper: &[f64]) -> Result<Vec<f64>, AppError> {
    for (i, (lo, hi)) in lower.iter().zip(upper).enumerate() {
        if !(lo < hi) {
            return Err(AppError::new(
                ErrorKind::InfeasibleBounds,
                Stage::Regression,
                format!("bounds for parameter {i} are infeasible: lower {lo} >= upper {hi}"),
            ));
        }
    }
    let mut p = start.to_vec();
    project(&mut p, lower, upper);
    Ok(p)
}

/// Minimise `½ Σ C²·ρ((r_i(p)/C)²)` subject to `lower ≤ p ≤ upper`.
///
/// `lower` / `upper` must have the same length as `start`; infinite entries
/// leave a parameter unbounded.
pub fn minimize<F>(
    residual_fn: F,
    start: &[f64],
    lower: &[f64],
    upper: &[f64],
    loss: Option<(RobustLoss, f64)>,
    settings: &SolverSettings,
) -> Result<Solution, AppError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut p = clamp_start(start, lower, upper)?;
    let n_params = p.len();

    let mut r = residual_fn(&p);
    let mut evaluations = 1;
    if !all_finite(&r) {
        return Err(AppError::new(
            ErrorKind::NotConverged,
            Stage::Regression,
            "residuals are not finite at the start point",
        ));
    }

    let mut scaled = scale_for_loss(loss, &r, numeric_jacobian(&residual_fn, &p, &r, upper));
    evaluations += n_params;

    let mut diag = vec![0.0_f64; n_params];
    let mut damping = settings.initial_damping;
    let mut growth = 2.0;
    let mut iterations = 0;

    let termination = loop {
        if scaled.cost == 0.0 {
            break Termination::ExactFit;
        }

        // Column norms only ever grow, as in MINPACK.
        for (j, d) in diag.iter_mut().enumerate() {
            let norm = scaled.jacobian.column(j).norm();
            *d = d.max(norm);
        }

        let gradient = scaled.jacobian.transpose() * &scaled.residuals;
        if projected_gradient_converged(&gradient, &scaled, &p, lower, upper, settings.gtol) {
            break Termination::GradientTolerance;
        }

        if iterations >= settings.max_iterations {
            return Err(AppError::new(
                ErrorKind::NotConverged,
                Stage::Regression,
                format!("no convergence within {} iterations", settings.max_iterations),
            ));
        }
        iterations += 1;

        let mut damp = DMatrix::zeros(n_params, n_params);
        for (j, d) in diag.iter().enumerate() {
            damp[(j, j)] = damping.sqrt() * if *d > 0.0 { *d } else { 1.0 };
        }
        let mut rhs = DVector::zeros(scaled.residuals.len() + n_params);
        rhs.rows_mut(0, scaled.residuals.len()).copy_from(&(-&scaled.residuals));

        let Some(h) = solve_least_squares(&vstack(&scaled.jacobian, &damp), &rhs) else {
            return Err(AppError::new(
                ErrorKind::SingularJacobian,
                Stage::Regression,
                "damped step could not be solved",
            ));
        };

        let mut trial: Vec<f64> = p.iter().zip(h.iter()).map(|(a, b)| a + b).collect();
        project(&mut trial, lower, upper);
        let step = DVector::from_iterator(n_params, trial.iter().zip(&p).map(|(a, b)| a - b));
        let step_norm = step.norm();
        let x_norm = DVector::from_column_slice(&p).norm();

        let r_trial = residual_fn(&trial);
        evaluations += 1;

        let trial_cost = if all_finite(&r_trial) { loss_cost(loss, &r_trial) } else { f64::INFINITY };
        let linearised = &scaled.residuals + &scaled.jacobian * &step;
        let predicted = 0.5 * scaled.residuals.norm_squared() - 0.5 * linearised.norm_squared();
        let actual = scaled.cost - trial_cost;

        if actual > 0.0 && predicted > 0.0 {
            let ratio = actual / predicted;
            let previous_cost = scaled.cost;

            p = trial;
            r = r_trial;
            scaled = scale_for_loss(loss, &r, numeric_jacobian(&residual_fn, &p, &r, upper));
            evaluations += n_params;

            damping *= (1.0 - (2.0 * ratio - 1.0).powi(3)).max(1.0 / 3.0);
            growth = 2.0;

            if actual <= settings.ftol * previous_cost && predicted <= settings.ftol * previous_cost {
                break Termination::CostTolerance;
            }
            if step_norm <= settings.xtol * (settings.xtol + x_norm) {
                break Termination::StepTolerance;
            }
        } else {
            if step_norm <= settings.xtol * (settings.xtol + x_norm) || damping > DAMPING_CEILING {
                break Termination::StepTolerance;
            }
            damping *= growth;
            growth *= 2.0;
        }
    };

    debug!(
        ?termination,
        iterations,
        evaluations,
        cost = scaled.cost,
        "least squares finished"
    );

    Ok(Solution {
        params: p,
        residuals: r,
        jacobian: scaled.jacobian,
        cost: scaled.cost,
        iterations,
        evaluations,
        termination,
    })
}

fn projected_gradient_converged(
    gradient: &DVector<f64>,
    scaled: &Scaled,
    p: &[f64],
    lower: &[f64],
    upper: &[f64],
    gtol: f64,
) -> bool {
    let r_norm = scaled.residuals.norm();
    if r_norm == 0.0 {
        return true;
    }
    gradient.iter().enumerate().all(|(j, g)| {
        let at_lower = p[j] <= lower[j] && *g > 0.0;
        let at_upper = p[j] >= upper[j] && *g < 0.0;
        if at_lower || at_upper {
            return true;
        }
        let col = scaled.jacobian.column(j).norm();
        col == 0.0 || g.abs() / (col * r_norm) <= gtol
    })
}
