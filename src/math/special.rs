//! Special functions used by the peak models and their derived quantities.
//!
//! - `erf` / `erfc` come from `statrs`
//! - `erfcx(x) = exp(x²)·erfc(x)` is the Faddeeva function on the imaginary axis
//! - the Faddeeva function `w(z)` uses Weideman's rational approximation
//!   (N = 40, accurate to ~1e-15 in the upper half-plane)
//! - `voigt_profile` is the normalised Voigt line shape `Re w(z) / (σ√(2π))`

use std::f64::consts::{PI, SQRT_2};
use std::sync::OnceLock;

use nalgebra::Complex;

pub use statrs::function::erf::{erf, erfc};

const WEIDEMAN_N: usize = 40;
const FRAC_1_SQRT_PI: f64 = 0.564_189_583_547_756_3;
const SQRT_2PI: f64 = 2.506_628_274_631_000_2;

struct Weideman {
    l: f64,
    /// `a[n]` for `n = 1..=N`; `a[0]` is unused.
    a: Vec<f64>,
}

fn weideman() -> &'static Weideman {
    static TABLE: OnceLock<Weideman> = OnceLock::new();
    TABLE.get_or_init(|| {
        let n = WEIDEMAN_N;
        let m = 2 * n;
        let l = (n as f64 / SQRT_2).sqrt();

        // Samples of exp(-t²)(L² + t²) on the mapped grid t = L·tan(θ/2).
        let samples: Vec<(f64, f64)> = (-(m as i64) + 1..m as i64)
            .map(|k| {
                let theta = k as f64 * PI / m as f64;
                let t = l * (theta / 2.0).tan();
                (theta, (-t * t).exp() * (l * l + t * t))
            })
            .collect();

        let a = (0..=n)
            .map(|j| {
                let sum: f64 = samples.iter().map(|(theta, f)| f * (j as f64 * theta).cos()).sum();
                sum / (2 * m) as f64
            })
            .collect();

        Weideman { l, a }
    })
}

/// Faddeeva function `w(z) = exp(-z²)·erfc(-iz)`.
pub fn faddeeva(z: Complex<f64>) -> Complex<f64> {
    if z.im < 0.0 {
        // w(z) = 2·exp(-z²) − w(−z)
        return (-z * z).exp() * 2.0 - faddeeva(-z);
    }

    let table = weideman();
    let i = Complex::new(0.0, 1.0);
    let denom = Complex::new(table.l, 0.0) - i * z;
    let zz = (Complex::new(table.l, 0.0) + i * z) / denom;

    let mut p = Complex::new(table.a[WEIDEMAN_N], 0.0);
    for n in (1..WEIDEMAN_N).rev() {
        p = p * zz + table.a[n];
    }

    p * 2.0 / (denom * denom) + Complex::new(FRAC_1_SQRT_PI, 0.0) / denom
}

/// Scaled complementary error function `exp(x²)·erfc(x)`.
///
/// On the positive axis `erfcx(x) = Re w(ix)`, which keeps the Voigt height
/// consistent with `voigt_profile` at the line centre.
pub fn erfcx(x: f64) -> f64 {
    if x < 0.0 {
        return 2.0 * (x * x).exp() - erfcx(-x);
    }
    faddeeva(Complex::new(0.0, x)).re
}

/// Voigt profile normalised to unit area.
///
/// `sigma` is the Gaussian standard deviation and `gamma` the Lorentzian
/// half-width at half-maximum. Either may be zero, reducing to the pure
/// Lorentzian or Gaussian shape.
pub fn voigt_profile(x: f64, sigma: f64, gamma: f64) -> f64 {
    if sigma == 0.0 {
        if gamma == 0.0 {
            return if x == 0.0 { f64::INFINITY } else { 0.0 };
        }
        return gamma / PI / (x * x + gamma * gamma);
    }
    if gamma == 0.0 {
        return gauss_pdf(x / sigma) / sigma;
    }

    let z = Complex::new(x / (sigma * SQRT_2), gamma / (sigma * SQRT_2));
    faddeeva(z).re / (sigma * SQRT_2PI)
}

/// Standard normal density.
pub fn gauss_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Standard normal cumulative distribution.
pub fn gauss_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erfcx_matches_reference_values() {
        let reference = [
            (0.5, 0.615_690_344_192_925_9),
            (1.0, 0.427_583_576_155_807),
            (3.0, 0.179_001_151_181_389_95),
            (8.0, 0.069_985_166_200_880_93),
            (50.0, 0.011_281_536_265_323_773),
        ];
        for (x, expected) in reference {
            let got = erfcx(x);
            assert!((got - expected).abs() / expected < 1e-14, "x={x} got={got}");
        }
        assert!(faddeeva(Complex::new(0.0, 0.5)).im.abs() < 1e-14);
    }

    #[test]
    fn faddeeva_real_part_is_gaussian_on_real_axis() {
        for i in 0..40 {
            let x = i as f64 * 0.25;
            let w = faddeeva(Complex::new(x, 0.0));
            assert!((w.re - (-x * x).exp()).abs() < 1e-13, "x={x}");
        }
    }

    #[test]
    fn faddeeva_lower_half_plane_uses_reflection() {
        let z = Complex::new(0.7, -0.3);
        let w = faddeeva(z);
        let expected = (-z * z).exp() * 2.0 - faddeeva(-z);
        assert!((w - expected).norm() < 1e-14);
    }

    #[test]
    fn erfcx_reflects_to_negative_arguments() {
        assert!((erfcx(0.0) - 1.0).abs() < 1e-15);
        let x: f64 = -0.7;
        let expected = (x * x).exp() * erfc(x);
        assert!((erfcx(x) - expected).abs() / expected < 1e-13);
    }

    #[test]
    fn voigt_reduces_to_limits_and_integrates_to_one() {
        let g = voigt_profile(0.3, 1.2, 0.0);
        assert!((g - gauss_pdf(0.3 / 1.2) / 1.2).abs() < 1e-15);

        let l = voigt_profile(0.3, 0.0, 0.5);
        assert!((l - 0.5 / PI / (0.09 + 0.25)).abs() < 1e-15);

        // Trapezoid over a wide window; the Lorentzian tails lose ~2γ/(πX).
        let (sigma, gamma) = (0.8, 0.05);
        let h = 0.01;
        let area: f64 = (-20000..=20000).map(|i| voigt_profile(i as f64 * h, sigma, gamma) * h).sum();
        assert!((area - 1.0).abs() < 5e-3, "area={area}");
    }

    #[test]
    fn gauss_cdf_symmetry() {
        assert!((gauss_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((gauss_cdf(1.3) + gauss_cdf(-1.3) - 1.0).abs() < 1e-14);
    }
}
