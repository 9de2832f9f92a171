//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - built from a JSON fit plan (`config`)
//! - passed through the fit pipeline by value or reference
//! - exported to JSON after a run

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Floor added to every present uncertainty value before weighting.
pub const UNCERTAINTY_FLOOR: f64 = 1e-10;

/// Uncertainty of one coordinate of a series.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Uncertainty {
    #[default]
    Absent,
    /// A single value broadcast to every point. `0.0` means "absent".
    Scalar(f64),
    /// One value per point (same length as `y` before filtering).
    PerPoint(Vec<f64>),
}

/// One raw data series as delivered by the tabular source.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub x_err: Uncertainty,
    pub y_err: Uncertainty,
}

/// All series of a plot. Fits select one of them by index.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub series: Vec<Series>,
}

/// Closed interval `[lo, hi]` on the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }
}

impl From<[f64; 2]> for Interval {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Interval> for [f64; 2] {
    fn from(value: Interval) -> Self {
        [value.lo, value.hi]
    }
}

/// Regression strategy.
///
/// `Lm`, `Trf` and `Dogbox` all run the same projected Levenberg–Marquardt
/// solver, which honours box bounds; the name is kept in the diagnostics as
/// requested. `Lm` with finite bounds is reported as `Trf`. `Odr` is
/// orthogonal distance regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Lm,
    Trf,
    Dogbox,
    Odr,
}

impl Method {
    pub fn display_name(self) -> &'static str {
        match self {
            Method::Lm => "lm",
            Method::Trf => "trf",
            Method::Dogbox => "dogbox",
            Method::Odr => "odr",
        }
    }
}

/// Robust loss kernel `ρ(z)` applied to `z = (r / scale)²`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobustLoss {
    Linear,
    SoftL1,
    Huber,
    Cauchy,
    Arctan,
}

/// ODR job mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OdrJob {
    #[default]
    Explicit,
    Implicit,
    /// Ordinary least squares: the x perturbations are held at zero.
    #[serde(rename = "ols")]
    OrdinaryLeastSquares,
}

/// How the weighted least squares covariance is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SigmaScaling {
    /// Absolute when y-uncertainties are present, relative otherwise.
    #[default]
    Auto,
    /// σ_y are true standard deviations: `cov = (JᵀJ)⁻¹`.
    Absolute,
    /// σ_y are relative weights: `cov = (JᵀJ)⁻¹ · χ²/(n−p)`.
    Relative,
}

/// Box bounds on the parameter vector.
///
/// An empty side means unbounded, a single value is broadcast to every
/// parameter, otherwise the length must match the parameter count. Infinite
/// values are allowed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self { lower, upper }
    }

    /// Expand to per-parameter vectors of length `n`.
    ///
    /// Returns `None` if either side has a length other than 0, 1 or `n`.
    pub fn expand(&self, n: usize) -> Option<(Vec<f64>, Vec<f64>)> {
        let lower = expand_side(&self.lower, n, f64::NEG_INFINITY)?;
        let upper = expand_side(&self.upper, n, f64::INFINITY)?;
        Some((lower, upper))
    }

    /// True if any expanded bound is finite.
    pub fn any_finite(&self) -> bool {
        self.lower.iter().chain(self.upper.iter()).any(|v| v.is_finite())
    }
}

fn expand_side(side: &[f64], n: usize, fill: f64) -> Option<Vec<f64>> {
    match side.len() {
        0 => Some(vec![fill; n]),
        1 => Some(vec![side[0]; n]),
        len if len == n => Some(side.to_vec()),
        _ => None,
    }
}

/// Iteration budget and tolerances of the nonlinear solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative reduction of the cost below which the fit is converged.
    pub ftol: f64,
    /// Relative step size below which the fit is converged.
    pub xtol: f64,
    /// Scaled gradient norm below which the fit is converged.
    pub gtol: f64,
    /// Initial Marquardt damping factor.
    pub initial_damping: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

/// Options of a single `fit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub method: Method,
    pub bounds: Bounds,
    /// Fit `log_base(y)` against `log_base(f(x))` when set.
    pub log_base: Option<f64>,
    /// Routes the fit to the robust-loss backend when set.
    pub loss: Option<RobustLoss>,
    pub loss_scale: f64,
    pub odr_job: OdrJob,
    pub sigma_scaling: SigmaScaling,
    pub solver: SolverSettings,
    /// Run leave-one-out cross-validation after the fit.
    pub cross_validate: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: Method::Lm,
            bounds: Bounds::unbounded(),
            log_base: None,
            loss: None,
            loss_scale: 1.0,
            odr_job: OdrJob::Explicit,
            sigma_scaling: SigmaScaling::Auto,
            solver: SolverSettings::default(),
            cross_validate: false,
        }
    }
}

/// Line shape of one peak in a composite peak model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakShape {
    /// Voigt profile, block `(A, σ, μ, γ)` or `(A, σ, μ)` with `γ ≡ σ`.
    Voigt,
    /// Skewed Gaussian, block `(A, σ, μ, α)`.
    SkewGauss,
}

/// Additive background term of a composite peak model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    #[default]
    None,
    /// `a·x + b`
    Linear,
    /// `a·x² + b·x + c`
    Quadratic,
}

impl Baseline {
    pub fn param_len(self) -> usize {
        match self {
            Baseline::None => 0,
            Baseline::Linear => 2,
            Baseline::Quadratic => 3,
        }
    }

    pub fn eval(self, x: f64, coeffs: &[f64]) -> f64 {
        match self {
            Baseline::None => 0.0,
            Baseline::Linear => coeffs[0] * x + coeffs[1],
            Baseline::Quadratic => coeffs[0] * x * x + coeffs[1] * x + coeffs[2],
        }
    }
}

/// Structured descriptor of a composite peak model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakFamily {
    pub shape: PeakShape,
    pub doubled: bool,
    /// Voigt only: the Lorentzian width parameter is the Gaussian width.
    pub fixed_width: bool,
    pub baseline: Baseline,
}

impl PeakFamily {
    pub fn peak_count(&self) -> usize {
        if self.doubled { 2 } else { 1 }
    }

    /// Number of parameters of one peak block.
    pub fn block_len(&self) -> usize {
        match (self.shape, self.fixed_width) {
            (PeakShape::Voigt, true) => 3,
            _ => 4,
        }
    }

    pub fn param_count(&self) -> usize {
        self.peak_count() * self.block_len() + self.baseline.param_len()
    }
}

/// Family a model belongs to; drives derived quantities and extra table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    #[default]
    Generic,
    /// Straight line; the table reports adjusted R².
    Linear,
    /// Exponential growth/decay; the table reports adjusted R².
    Exponential,
    Peak(PeakFamily),
}

impl ModelFamily {
    /// Whether the parameter table carries an `R^2` row.
    pub fn reports_r_squared(self) -> bool {
        matches!(self, ModelFamily::Linear | ModelFamily::Exponential)
    }

    pub fn peak(self) -> Option<PeakFamily> {
        match self {
            ModelFamily::Peak(p) => Some(p),
            _ => None,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Relative cost reduction below `ftol`.
    CostTolerance,
    /// Relative step below `xtol`.
    StepTolerance,
    /// Gradient below `gtol`.
    GradientTolerance,
    /// Residuals are exactly zero.
    ExactFit,
}

/// Solver-side details of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverDiagnostics {
    /// Backend that actually ran (may differ from the requested method).
    pub method: Method,
    pub robust: bool,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
    /// Final cost `½ Σ r²` in the solver's own scaling.
    pub cost: f64,
    /// Number of singular values kept by the covariance estimate.
    pub rank: usize,
}

/// Fitted parameters and their standard errors.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub params: Vec<f64>,
    pub errors: Vec<f64>,
    pub covariance: Option<DMatrix<f64>>,
}

/// Output of a `fit` call.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub result: FitResult,
    pub diagnostics: SolverDiagnostics,
}

/// Leave-one-out cross-validation summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    /// `None` when no held-out prediction could be made.
    pub rmse: Option<f64>,
    pub attempted: usize,
    pub succeeded: usize,
}

impl CrossValidation {
    pub fn is_degraded(&self) -> bool {
        self.succeeded < self.attempted
    }
}

/// Goodness-of-fit statistics of one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    pub n: usize,
    pub n_params: usize,
    pub rmse: f64,
    pub r_squared: f64,
    pub adj_r_squared: Option<f64>,
    pub chi_squared: Option<f64>,
    pub reduced_chi_squared: Option<f64>,
    pub cross_validation: Option<CrossValidation>,
    /// Residuals `f − y`, normalised by σ_y when uncertainties are present.
    pub residuals: Vec<f64>,
    pub residuals_normalized: bool,
}

impl GoodnessOfFit {
    pub fn dof(&self) -> isize {
        self.n as isize - self.n_params as isize
    }
}

/// A secondary quantity computed from fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedQuantity {
    /// Console name, e.g. `Height 1`.
    pub name: String,
    /// LaTeX label, e.g. `\text{Height}\text{ 1}`.
    pub label: String,
    pub value: f64,
    pub uncertainty: f64,
}

/// Caller-supplied LaTeX metadata for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolicLabels {
    /// LaTeX rendering of the model function.
    pub function: String,
    /// One LaTeX label per model parameter.
    pub params: Vec<String>,
}

/// One `(label, value, uncertainty)` row of a table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub label: String,
    pub value: f64,
    pub uncertainty: f64,
}

/// All rows of one named fit in the parameter table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub function: String,
    pub rows: Vec<TableRow>,
}

/// Visible axis state handed in by the plot sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    pub x_limits: Interval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_expand_broadcasts_scalars() {
        let b = Bounds::new(vec![0.0], vec![]);
        let (lo, hi) = b.expand(3).unwrap();
        assert_eq!(lo, vec![0.0, 0.0, 0.0]);
        assert!(hi.iter().all(|v| v.is_infinite() && *v > 0.0));
        assert!(b.any_finite());
        assert!(Bounds::new(vec![0.0, 1.0], vec![]).expand(3).is_none());
    }

    #[test]
    fn peak_family_param_counts() {
        let fam = PeakFamily {
            shape: PeakShape::Voigt,
            doubled: true,
            fixed_width: true,
            baseline: Baseline::Linear,
        };
        assert_eq!(fam.block_len(), 3);
        assert_eq!(fam.param_count(), 8);
    }

    #[test]
    fn interval_deserializes_from_pair() {
        let iv: Interval = serde_json::from_str("[1.5, 3.0]").unwrap();
        assert_eq!(iv, Interval::new(1.5, 3.0));
        assert!(iv.contains(3.0));
    }
}
