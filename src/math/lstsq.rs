//! Small dense least squares solves.
//!
//! The nonlinear solvers compute each damped Gauss–Newton step as the least
//! squares solution of an augmented system
//!
//! ```text
//! [   J   ]        [ -r ]
//! [ √λ·D  ] · h ≈  [  0 ]
//! ```
//!
//! which avoids forming `JᵗJ` explicitly. nalgebra's `QR::solve` only handles
//! square systems, so the tall system is solved through SVD.

use nalgebra::{DMatrix, DVector};

/// Solve `min ‖a·x − b‖` using SVD.
///
/// Returns `None` if no finite solution is found even at the loosest
/// singular-value cutoff.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    for &tol in &[1e-14, 1e-10, 1e-6] {
        let cutoff = tol * svd.singular_values.max();
        if let Ok(x) = svd.solve(b, cutoff) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Stack `top` over `bottom` (equal column counts).
pub fn vstack(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    out.rows_mut(0, top.nrows()).copy_from(top);
    out.rows_mut(top.nrows(), bottom.nrows()).copy_from(bottom);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // y = 2 + 3x on x = [0, 1, 2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let x = solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damped_rows_shrink_the_step() {
        let j = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let r = DVector::from_row_slice(&[-2.0, -2.0]);
        let damp = DMatrix::from_row_slice(1, 1, &[10.0]);
        let aug = vstack(&j, &damp);
        let mut rhs = DVector::zeros(3);
        rhs.rows_mut(0, 2).copy_from(&(-&r));

        let undamped = solve_least_squares(&j, &(-&r)).unwrap();
        let damped = solve_least_squares(&aug, &rhs).unwrap();
        assert!((undamped[0] - 2.0).abs() < 1e-12);
        assert!(damped[0] > 0.0 && damped[0] < undamped[0]);
    }
}
