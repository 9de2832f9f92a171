//! Model evaluation.
//!
//! A `Model` is a named, parameter-ordered function `f(x; p)`. Built-in kinds
//! are evaluated by a single `match` in `predict`; caller-defined models wrap a
//! closure. Derived-quantity rules and the table index into the parameter
//! vector in the order given by `param_names`.

use std::fmt;
use std::sync::Arc;

use crate::domain::{Baseline, ModelFamily, PeakFamily, PeakShape};
use crate::math::special::{erf, gauss_pdf, voigt_profile};

/// Caller-supplied model function `f(x, params)`.
pub type ModelFn = Arc<dyn Fn(f64, &[f64]) -> f64 + Send + Sync>;

/// Built-in model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// `A·x + B`
    Linear,
    /// `a·x² + b·x + c`
    Quadratic,
    /// `A·exp(k·x)`
    ExpFit,
    /// `A·exp(−k·x)`
    FallingExpFit,
    /// `A·φ((x−EV)/SD)/SD`
    GaussPdf,
    /// `A·Φ((x−EV)/SD)`
    GaussCdf,
    /// `A·(1 − Φ((x−EV)/SD))`
    MinusGaussCdf,
    /// `a / sin⁴((x + x₀)/2)` with the angle in degrees.
    Rutherford,
    /// Sum of one or two Voigt / skewed-Gauss peaks plus an optional baseline.
    Peak(PeakFamily),
}

#[derive(Clone)]
enum Evaluator {
    Builtin(BuiltinKind),
    Custom(ModelFn),
}

#[derive(Clone)]
pub struct Model {
    name: String,
    params: Vec<String>,
    family: ModelFamily,
    evaluator: Evaluator,
}

impl Model {
    pub fn builtin(name: impl Into<String>, params: &[&str], family: ModelFamily, kind: BuiltinKind) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            family,
            evaluator: Evaluator::Builtin(kind),
        }
    }

    /// Wrap a caller-defined function.
    ///
    /// `family` declares which derived quantities apply; use
    /// `ModelFamily::Generic` when none do.
    pub fn custom<F>(name: impl Into<String>, params: Vec<String>, family: ModelFamily, f: F) -> Self
    where
        F: Fn(f64, &[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            family,
            evaluator: Evaluator::Custom(Arc::new(f)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Evaluate `f(x; params)`.
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        match &self.evaluator {
            Evaluator::Builtin(kind) => predict(*kind, x, params),
            Evaluator::Custom(f) => f(x, params),
        }
    }

    pub fn eval_many(&self, xs: &[f64], params: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x, params)).collect()
    }

    /// Baseline contribution at `x` for peak models that carry one.
    pub fn baseline(&self, x: f64, params: &[f64]) -> Option<f64> {
        let peak = self.family.peak()?;
        if peak.baseline == Baseline::None {
            return None;
        }
        let offset = params.len().checked_sub(peak.baseline.param_len())?;
        Some(peak.baseline.eval(x, &params[offset..]))
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let evaluator = match &self.evaluator {
            Evaluator::Builtin(kind) => format!("{kind:?}"),
            Evaluator::Custom(_) => "custom".to_string(),
        };
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("family", &self.family)
            .field("evaluator", &evaluator)
            .finish()
    }
}

/// Evaluate a built-in model kind.
///
/// # Panics
/// Panics if `p` is shorter than the kind's parameter count. Callers validate
/// the start vector length against `Model::param_count` first.
pub fn predict(kind: BuiltinKind, x: f64, p: &[f64]) -> f64 {
    match kind {
        BuiltinKind::Linear => p[0] * x + p[1],
        BuiltinKind::Quadratic => p[0] * x * x + p[1] * x + p[2],
        BuiltinKind::ExpFit => p[0] * (p[1] * x).exp(),
        BuiltinKind::FallingExpFit => p[0] * (-p[1] * x).exp(),
        BuiltinKind::GaussPdf => {
            let sd = p[1].abs();
            p[0] * gauss_pdf((x - p[2]) / sd) / sd
        }
        BuiltinKind::GaussCdf => p[0] * 0.5 * (1.0 + erf((x - p[2]) / (std::f64::consts::SQRT_2 * p[1].abs()))),
        BuiltinKind::MinusGaussCdf => {
            p[0] * 0.5 * (1.0 - erf((x - p[2]) / (std::f64::consts::SQRT_2 * p[1].abs())))
        }
        BuiltinKind::Rutherford => p[0] / ((x + p[1]) / 2.0).to_radians().sin().powi(4),
        BuiltinKind::Peak(family) => predict_peaks(&family, x, p),
    }
}

fn predict_peaks(family: &PeakFamily, x: f64, p: &[f64]) -> f64 {
    let block = family.block_len();
    let mut y = 0.0;
    for i in 0..family.peak_count() {
        let b = &p[i * block..(i + 1) * block];
        y += match family.shape {
            PeakShape::Voigt => {
                let gamma = if family.fixed_width { b[1] } else { b[3] };
                b[0] * voigt_profile(x - b[2], b[1], gamma)
            }
            PeakShape::SkewGauss => skewed_gauss(x, b[0], b[1], b[2], b[3]),
        };
    }
    let base = family.peak_count() * block;
    y + family.baseline.eval(x, &p[base..])
}

/// `A · 2/σ · φ((x−μ)/σ) · Φ(α(x−μ)/σ)` with σ taken as `|σ|`.
pub fn skewed_gauss(x: f64, a: f64, sigma: f64, mu: f64, alpha: f64) -> f64 {
    let sd = sigma.abs();
    let t = (x - mu) / sd;
    let cdf = 0.5 * (1.0 + erf(alpha * t / std::f64::consts::SQRT_2));
    a * 2.0 * gauss_pdf(t) / sd * cdf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Baseline, PeakShape};

    #[test]
    fn builtin_kinds_evaluate() {
        assert_eq!(predict(BuiltinKind::Linear, 2.0, &[3.0, 1.0]), 7.0);
        assert_eq!(predict(BuiltinKind::Quadratic, 2.0, &[1.0, 1.0, 1.0]), 7.0);
        assert!((predict(BuiltinKind::FallingExpFit, 1.0, &[2.0, 0.5]) - 2.0 * (-0.5f64).exp()).abs() < 1e-15);
        let cdf_mid = predict(BuiltinKind::GaussCdf, 1.0, &[4.0, 2.0, 1.0]);
        assert!((cdf_mid - 2.0).abs() < 1e-15);
        let sum = cdf_mid + predict(BuiltinKind::MinusGaussCdf, 1.0, &[4.0, 2.0, 1.0]);
        assert!((sum - 4.0).abs() < 1e-15);
        assert!((predict(BuiltinKind::Rutherford, 180.0, &[3.0, 0.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn skewed_gauss_without_skew_is_gauss_pdf() {
        let a = skewed_gauss(0.7, 2.0, 1.5, 0.2, 0.0);
        let b = predict(BuiltinKind::GaussPdf, 0.7, &[2.0, 1.5, 0.2]);
        assert!((a - b).abs() < 1e-15);
    }

    #[test]
    fn peak_composite_adds_baseline_from_trailing_params() {
        let family = PeakFamily {
            shape: PeakShape::Voigt,
            doubled: false,
            fixed_width: true,
            baseline: Baseline::Linear,
        };
        let model = Model::builtin("VoigtUnderFixLinear", &["A", "SD", "EV", "a", "b"], ModelFamily::Peak(family), BuiltinKind::Peak(family));
        let p = [2.0, 0.5, 1.0, 0.1, 3.0];
        let peak = 2.0 * voigt_profile(0.0, 0.5, 0.5);
        assert!((model.eval(1.0, &p) - (peak + 0.1 + 3.0)).abs() < 1e-14);
        assert!((model.baseline(1.0, &p).unwrap() - 3.1).abs() < 1e-15);
    }

    #[test]
    fn custom_model_uses_closure() {
        let model = Model::custom("Square", vec!["k".into()], ModelFamily::Generic, |x, p| p[0] * x * x);
        assert_eq!(model.eval(3.0, &[2.0]), 18.0);
        assert_eq!(model.baseline(3.0, &[2.0]), None);
        assert!(format!("{model:?}").contains("custom"));
    }
}
