//! Derived quantities of peak models.
//!
//! For every peak block of a `PeakFamily` the fitted parameters are turned into
//! physically meaningful quantities with first-order (linear) uncertainty
//! propagation from analytic partial derivatives:
//!
//! - Voigt `(A, σ, μ, γ)`: peak height above the baseline and FWHM
//! - skewed Gaussian `(A, σ, μ, α)`: mean position and the model value there
//!
//! Parameter uncertainties are treated as independent.

use std::f64::consts::{LN_2, PI, SQRT_2};

use crate::domain::{DerivedQuantity, ModelFamily, PeakFamily, PeakShape};
use crate::error::{AppError, Stage};
use crate::math::special::{erf, erfcx};

const SQRT_2PI: f64 = 2.506_628_274_631_000_2;
/// Olivero–Longbothum FWHM approximation coefficients.
const FWHM_LORENTZ: f64 = 0.5346;
const FWHM_MIXED: f64 = 0.2166;

/// Value and standard uncertainty of one derived quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub uncertainty: f64,
}

/// Derived quantities for every peak of `family`.
///
/// Returns an empty list for non-peak families.
pub fn propagate(family: ModelFamily, params: &[f64], errors: &[f64]) -> Result<Vec<DerivedQuantity>, AppError> {
    let Some(peak) = family.peak() else {
        return Ok(Vec::new());
    };
    if params.len() != errors.len() {
        return Err(AppError::invalid(
            Stage::Propagation,
            format!("{} parameters but {} uncertainties", params.len(), errors.len()),
        ));
    }

    let stride = block_stride(&peak, params.len())?;
    let mut out = Vec::new();
    for i in 0..peak.peak_count() {
        let b = &params[i * stride..];
        let e = &errors[i * stride..];
        let (console_suffix, latex_suffix) = if peak.doubled {
            (format!(" {}", i + 1), format!("\\text{{ {}}}", i + 1))
        } else {
            (String::new(), String::new())
        };

        let quantities = match peak.shape {
            PeakShape::Voigt => {
                let (gamma, gamma_err) = if peak.fixed_width { (b[1], e[1]) } else { (b[3], e[3]) };
                let height = voigt_height(b[0], b[1], gamma, e[0], e[1], gamma_err);
                let fwhm = voigt_fwhm(b[1], gamma, e[1], gamma_err);
                [("Height", "\\text{Height}", height), ("FWHM", "\\text{FWHM}", fwhm)]
            }
            PeakShape::SkewGauss => {
                let mean = skew_mean(b[1], b[2], b[3], e[1], e[2], e[3]);
                let mean_y = skew_mean_value(b[0], b[1], b[3], e[0], e[1], e[3]);
                [("Mean", "Mean", mean), ("MeanY", "f(Mean)", mean_y)]
            }
        };

        for (name, label, est) in quantities {
            out.push(DerivedQuantity {
                name: format!("{name}{console_suffix}"),
                label: format!("{label}{latex_suffix}"),
                value: est.value,
                uncertainty: est.uncertainty,
            });
        }
    }
    Ok(out)
}

/// Mean positions of every skewed-Gauss peak; empty for other families.
pub fn skew_means(family: ModelFamily, params: &[f64]) -> Vec<f64> {
    let Some(peak) = family.peak().filter(|p| p.shape == PeakShape::SkewGauss) else {
        return Vec::new();
    };
    let Ok(stride) = block_stride(&peak, params.len()) else {
        return Vec::new();
    };
    (0..peak.peak_count())
        .map(|i| {
            let b = &params[i * stride..];
            skew_mean(b[1], b[2], b[3], 0.0, 0.0, 0.0).value
        })
        .collect()
}

/// Parameter stride between peak blocks: `(p − baseline_len) / peaks`.
fn block_stride(peak: &PeakFamily, n_params: usize) -> Result<usize, AppError> {
    let baseline = peak.baseline.param_len();
    let stride = n_params.saturating_sub(baseline) / peak.peak_count();
    if stride < peak.block_len() || n_params < baseline {
        return Err(AppError::invalid(
            Stage::Propagation,
            format!("{n_params} parameters do not fit the declared peak family"),
        ));
    }
    Ok(stride)
}

fn quadrature(terms: &[f64]) -> f64 {
    terms.iter().map(|t| t * t).sum::<f64>().sqrt()
}

/// Height `V(0; A, σ, γ) = A·erfcx(u)/(σ√(2π))` with `u = γ/(σ√2)`.
pub fn voigt_height(a: f64, sigma: f64, gamma: f64, a_err: f64, sigma_err: f64, gamma_err: f64) -> Estimate {
    let u = gamma / (sigma * SQRT_2);
    let ex = erfcx(u);
    let value = a * ex / (sigma * SQRT_2PI);

    // d erfcx(u)/du = 2u·erfcx(u) − 2/√π
    let d_a = ex / (sigma * SQRT_2PI);
    let d_sigma = a / (SQRT_2PI * sigma * sigma) * (-ex * (1.0 + 2.0 * u * u) + 2.0 * u / PI.sqrt());
    let d_gamma = a * gamma * ex / (SQRT_2PI * sigma.powi(3)) - a / (PI * sigma * sigma);

    Estimate {
        value,
        uncertainty: quadrature(&[d_a * a_err, d_sigma * sigma_err, d_gamma * gamma_err]),
    }
}

/// FWHM `0.5346·f_L + sqrt(0.2166·f_L² + f_G²)`, `f_L = 2γ`, `f_G = sqrt(8 ln 2)·σ`.
pub fn voigt_fwhm(sigma: f64, gamma: f64, sigma_err: f64, gamma_err: f64) -> Estimate {
    let k1 = 2.0 * FWHM_LORENTZ;
    let k2 = 4.0 * FWHM_MIXED;
    let k3 = 8.0 * LN_2;
    let root = (k2 * gamma * gamma + k3 * sigma * sigma).sqrt();
    let value = k1 * gamma + root;

    let d_gamma = k1 + k2 * gamma / root;
    let d_sigma = k3 * sigma / root;

    Estimate {
        value,
        uncertainty: quadrature(&[d_gamma * gamma_err, d_sigma * sigma_err]),
    }
}

/// Mean `μ + |σ|·δ·sqrt(2/π)` of a skewed Gaussian, `δ = α/sqrt(1+α²)`.
pub fn skew_mean(sigma: f64, mu: f64, alpha: f64, sigma_err: f64, mu_err: f64, alpha_err: f64) -> Estimate {
    let sd = sigma.abs();
    let c = (2.0 / PI).sqrt();
    let one_plus = 1.0 + alpha * alpha;
    let delta = alpha / one_plus.sqrt();

    Estimate {
        value: mu + sd * delta * c,
        uncertainty: quadrature(&[mu_err, delta * c * sigma_err, sd / one_plus.powf(1.5) * c * alpha_err]),
    }
}

/// Model value at the mean, `A/(σ√(2π))·exp(−δ²/π)·(1 + erf(αδ/√π))`.
pub fn skew_mean_value(a: f64, sigma: f64, alpha: f64, a_err: f64, sigma_err: f64, alpha_err: f64) -> Estimate {
    let sd = sigma.abs();
    let one_plus = 1.0 + alpha * alpha;
    let delta2 = alpha * alpha / one_plus;
    let s = alpha * alpha / (PI * one_plus).sqrt();
    let g = (-delta2 / PI).exp() * (1.0 + erf(s));
    let prefactor = a / (sd * SQRT_2PI);
    let value = prefactor * g;

    // dg/dα: chain rule through δ²/π and the erf argument.
    let d_exp = -2.0 * alpha / (PI * one_plus * one_plus);
    let d_erf = 2.0 / PI * (-alpha * alpha / PI).exp() * alpha * (2.0 + alpha * alpha) / one_plus.powf(1.5);
    let dg = (-delta2 / PI).exp() * (d_exp * (1.0 + erf(s))) + d_erf;

    let d_a = g / (sd * SQRT_2PI);
    let d_sigma = -value / sd;
    let d_alpha = prefactor * dg;

    Estimate {
        value,
        uncertainty: quadrature(&[d_a * a_err, d_sigma * sigma_err, d_alpha * alpha_err]),
    }
}
