//! Parameter covariance from a Jacobian.
//!
//! For residuals `r(p)` with Jacobian `J = U·S·Vᵗ` the linearised covariance is
//! `(JᵗJ)⁻¹ = V·S⁻²·Vᵗ`. Singular values below
//! `eps · max(rows, cols) · s_max` are dropped so that a rank-deficient
//! Jacobian yields a finite (pseudo-inverse) covariance instead of infinities.

use nalgebra::DMatrix;

use crate::error::{AppError, ErrorKind, Stage};

/// Covariance matrix and the number of singular values that were kept.
#[derive(Debug, Clone)]
pub struct Covariance {
    pub matrix: DMatrix<f64>,
    pub rank: usize,
}

impl Covariance {
    /// Square roots of the diagonal.
    pub fn standard_errors(&self) -> Vec<f64> {
        standard_errors(&self.matrix)
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.matrix *= factor;
        self
    }

    pub fn is_full_rank(&self) -> bool {
        self.rank == self.matrix.ncols()
    }
}

/// Rank-truncated `(JᵗJ)⁻¹` of an `n × p` Jacobian.
pub fn covariance_from_jacobian(jac: &DMatrix<f64>) -> Result<Covariance, AppError> {
    let p = jac.ncols();
    if p == 0 {
        return Ok(Covariance {
            matrix: DMatrix::zeros(0, 0),
            rank: 0,
        });
    }
    if jac.iter().any(|v| !v.is_finite()) {
        return Err(AppError::new(
            ErrorKind::SingularJacobian,
            Stage::Regression,
            "Jacobian contains non-finite entries",
        ));
    }

    let svd = jac.clone().svd(false, true);
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| AppError::new(ErrorKind::SingularJacobian, Stage::Regression, "SVD did not converge"))?;

    let s_max = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = f64::EPSILON * jac.nrows().max(p) as f64 * s_max;

    let mut matrix = DMatrix::<f64>::zeros(p, p);
    let mut rank = 0;
    for (k, &s) in svd.singular_values.iter().enumerate() {
        if s <= threshold || s == 0.0 {
            continue;
        }
        rank += 1;
        let v_k = v_t.row(k).transpose();
        matrix += (&v_k * v_k.transpose()) / (s * s);
    }

    if rank == 0 {
        return Err(AppError::new(
            ErrorKind::SingularJacobian,
            Stage::Regression,
            "Jacobian has no singular value above the truncation tolerance",
        ));
    }

    Ok(Covariance { matrix, rank })
}

/// `sqrt(max(diag, 0))` of a covariance matrix.
pub fn standard_errors(cov: &DMatrix<f64>) -> Vec<f64> {
    cov.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect()
}
