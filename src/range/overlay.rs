//! Numeric overlay curves handed to a plot sink.

use serde::Serialize;

use crate::domain::Interval;
use crate::models::Model;
use crate::propagate::skew_means;

use super::resolve::linspace;

/// Number of samples of an overlay curve.
pub const OVERLAY_SAMPLES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Everything a plot sink needs to draw one fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    /// Fitted curve, split around the excluded interval.
    pub segments: Vec<Curve>,
    /// Baseline of peak models, split the same way.
    pub baseline: Vec<Curve>,
    /// Mean positions of skewed peaks (vertical markers).
    pub mean_markers: Vec<f64>,
}

/// Sample the fitted model over `range`.
///
/// With an excluded interval the samples split into `x ≤ eLo` and `x ≥ eHi`;
/// empty pieces are dropped.
pub fn build_overlay(model: &Model, params: &[f64], range: (f64, f64), excluded: Option<Interval>) -> Overlay {
    let xs = linspace(range.0, range.1, OVERLAY_SAMPLES);
    let pieces: Vec<Vec<f64>> = match excluded {
        Some(ex) => vec![
            xs.iter().copied().filter(|x| *x <= ex.lo).collect(),
            xs.iter().copied().filter(|x| *x >= ex.hi).collect(),
        ],
        None => vec![xs],
    };
    let pieces: Vec<Vec<f64>> = pieces.into_iter().filter(|p| !p.is_empty()).collect();

    let segments = pieces
        .iter()
        .map(|x| Curve {
            y: model.eval_many(x, params),
            x: x.clone(),
        })
        .collect();

    let baseline = if model.baseline(range.0, params).is_some() {
        pieces
            .iter()
            .map(|x| Curve {
                y: x.iter().filter_map(|&v| model.baseline(v, params)).collect(),
                x: x.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Overlay {
        segments,
        baseline,
        mean_markers: skew_means(model.family(), params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lookup;

    #[test]
    fn excluded_interval_splits_the_curve() {
        let model = lookup("Linear").unwrap();
        let overlay = build_overlay(&model, &[1.0, 0.0], (0.0, 10.0), Some(Interval::new(4.0, 6.0)));
        assert_eq!(overlay.segments.len(), 2);
        assert!(overlay.segments[0].x.iter().all(|x| *x <= 4.0));
        assert!(overlay.segments[1].x.iter().all(|x| *x >= 6.0));
        assert!(overlay.baseline.is_empty());
        assert!(overlay.mean_markers.is_empty());
    }

    #[test]
    fn peak_with_baseline_gets_baseline_curve_and_markers() {
        let model = lookup("SkewedGaussUnderLinear").unwrap();
        let p = [1.0, 0.5, 2.0, 3.0, 0.1, 1.0];
        let overlay = build_overlay(&model, &p, (0.0, 4.0), None);
        assert_eq!(overlay.segments.len(), 1);
        assert_eq!(overlay.segments[0].x.len(), OVERLAY_SAMPLES);
        let base = &overlay.baseline[0];
        assert!((base.y[0] - 1.0).abs() < 1e-15);
        assert!((base.y[OVERLAY_SAMPLES - 1] - 1.4).abs() < 1e-12);
        assert_eq!(overlay.mean_markers.len(), 1);
        assert!(overlay.mean_markers[0] > 2.0);
    }
}
