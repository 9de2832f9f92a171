//! Symbolic plot-range resolution.
//!
//! A plot range is either a keyword for both ends or a pair of endpoints. An
//! endpoint is the visible axis limit, the fit interval limit, a number, or a
//! crossing of the fitted curve with a horizontal line.
//!
//! JSON forms accepted by the fit plan:
//!
//! ```text
//! "visible" | "fit" | "cross"
//! [lo, hi]  where each end is a number, "visible", "fit", "cross" or {"cross": y}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{Interval, RenderContext};

/// Number of samples of the crossing search over the visible range.
pub const CROSS_SAMPLES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "EndpointRepr", into = "EndpointRepr")]
pub enum Endpoint {
    Visible,
    Fit,
    Value(f64),
    /// First point where the curve crosses `y = target`.
    Cross { target: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "RangeRepr", into = "RangeRepr")]
pub enum PlotRange {
    #[default]
    Visible,
    Fit,
    /// Crossing of `y = 0` on both ends.
    Cross,
    Pair(Endpoint, Endpoint),
}

impl PlotRange {
    fn endpoints(self) -> [Endpoint; 2] {
        match self {
            PlotRange::Visible => [Endpoint::Visible, Endpoint::Visible],
            PlotRange::Fit => [Endpoint::Fit, Endpoint::Fit],
            PlotRange::Cross => [Endpoint::Cross { target: 0.0 }, Endpoint::Cross { target: 0.0 }],
            PlotRange::Pair(lo, hi) => [lo, hi],
        }
    }
}

/// Resolve `range` to concrete `(lo, hi)` x-limits.
///
/// The lower end is resolved first; a crossing on the upper end starts its
/// search at the resolved lower end. The crossing search walks
/// `CROSS_SAMPLES` evenly spaced points of the visible range and returns the
/// first sample whose above/below state differs from the start point
/// (`f ≥ target` counts as above). Without a change of state the last sample
/// (the visible upper limit) is returned.
pub fn resolve_range<F>(range: PlotRange, ctx: &RenderContext, fit_interval: Interval, f: F) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let [lo_end, hi_end] = range.endpoints();
    let lo = resolve_endpoint(lo_end, 0, None, ctx, fit_interval, &f);
    let hi = resolve_endpoint(hi_end, 1, Some(lo), ctx, fit_interval, &f);
    (lo, hi)
}

fn resolve_endpoint<F>(
    end: Endpoint,
    side: usize,
    resolved_lower: Option<f64>,
    ctx: &RenderContext,
    fit_interval: Interval,
    f: &F,
) -> f64
where
    F: Fn(f64) -> f64,
{
    let limits = ctx.x_limits;
    match end {
        Endpoint::Visible => [limits.lo, limits.hi][side],
        Endpoint::Fit => [fit_interval.lo, fit_interval.hi][side],
        Endpoint::Value(v) => v,
        Endpoint::Cross { target } => {
            let samples = linspace(limits.lo, limits.hi, CROSS_SAMPLES);
            let start = resolved_lower.unwrap_or(samples[0]);
            find_crossing(&samples, start, target, f)
        }
    }
}

fn find_crossing<F>(samples: &[f64], start: f64, target: f64, f: &F) -> f64
where
    F: Fn(f64) -> f64,
{
    let above = f(start) >= target;
    samples
        .iter()
        .copied()
        .filter(|x| *x >= start)
        .find(|&x| {
            let y = f(x);
            (above && y < target) || (!above && y >= target)
        })
        .unwrap_or(samples[samples.len() - 1])
}

/// `n` evenly spaced points with both ends exact.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| lo + step * i as f64).collect();
            out[n - 1] = hi;
            out
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Value(f64),
    Keyword(Keyword),
    Cross { cross: f64 },
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Keyword {
    Visible,
    Fit,
    Cross,
}

impl From<EndpointRepr> for Endpoint {
    fn from(repr: EndpointRepr) -> Self {
        match repr {
            EndpointRepr::Value(v) => Endpoint::Value(v),
            EndpointRepr::Keyword(Keyword::Visible) => Endpoint::Visible,
            EndpointRepr::Keyword(Keyword::Fit) => Endpoint::Fit,
            EndpointRepr::Keyword(Keyword::Cross) => Endpoint::Cross { target: 0.0 },
            EndpointRepr::Cross { cross } => Endpoint::Cross { target: cross },
        }
    }
}

impl From<Endpoint> for EndpointRepr {
    fn from(end: Endpoint) -> Self {
        match end {
            Endpoint::Visible => EndpointRepr::Keyword(Keyword::Visible),
            Endpoint::Fit => EndpointRepr::Keyword(Keyword::Fit),
            Endpoint::Value(v) => EndpointRepr::Value(v),
            Endpoint::Cross { target } => EndpointRepr::Cross { cross: target },
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Keyword(Keyword),
    Pair(Endpoint, Endpoint),
}

impl From<RangeRepr> for PlotRange {
    fn from(repr: RangeRepr) -> Self {
        match repr {
            RangeRepr::Keyword(Keyword::Visible) => PlotRange::Visible,
            RangeRepr::Keyword(Keyword::Fit) => PlotRange::Fit,
            RangeRepr::Keyword(Keyword::Cross) => PlotRange::Cross,
            RangeRepr::Pair(lo, hi) => PlotRange::Pair(lo, hi),
        }
    }
}

impl From<PlotRange> for RangeRepr {
    fn from(range: PlotRange) -> Self {
        match range {
            PlotRange::Visible => RangeRepr::Keyword(Keyword::Visible),
            PlotRange::Fit => RangeRepr::Keyword(Keyword::Fit),
            PlotRange::Cross => RangeRepr::Keyword(Keyword::Cross),
            PlotRange::Pair(lo, hi) => RangeRepr::Pair(lo, hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        RenderContext {
            x_limits: Interval::new(0.0, 10.0),
        }
    }

    #[test]
    fn crossing_is_found_near_the_root() {
        let range = PlotRange::Pair(Endpoint::Value(0.0), Endpoint::Cross { target: 0.0 });
        let (lo, hi) = resolve_range(range, &ctx(), Interval::new(1.0, 9.0), |x| x - 5.0);
        assert_eq!(lo, 0.0);
        assert!((hi - 5.0).abs() < 2.0 * 10.0 / (CROSS_SAMPLES - 1) as f64, "hi={hi}");
        assert!(hi >= 5.0);
    }

    #[test]
    fn cross_keyword_runs_from_first_root_onwards() {
        let (lo, hi) = resolve_range(PlotRange::Cross, &ctx(), Interval::new(1.0, 9.0), |x| (x - 2.0) * (x - 7.0));
        // Starts above zero at x = 0, first flip just past 2, then the upper
        // search starts below zero there and flips just past 7.
        assert!((lo - 2.0).abs() < 2e-3);
        assert!((hi - 7.0).abs() < 2e-3);
    }

    #[test]
    fn no_crossing_returns_last_sample() {
        let range = PlotRange::Pair(Endpoint::Fit, Endpoint::Cross { target: 0.0 });
        let (lo, hi) = resolve_range(range, &ctx(), Interval::new(1.0, 9.0), |x| x + 100.0);
        assert_eq!(lo, 1.0);
        assert_eq!(hi, 10.0);
    }

    #[test]
    fn crossing_at_zero_abscissa_is_kept() {
        // A root at x = 0 must not be mistaken for "no crossing".
        let ctx = RenderContext {
            x_limits: Interval::new(-1.0, 1.0),
        };
        let samples = linspace(-1.0, 1.0, 3);
        assert_eq!(samples, vec![-1.0, 0.0, 1.0]);
        let x = find_crossing(&samples, -1.0, 0.0, &|x: f64| x);
        assert_eq!(x, 0.0);
        let (lo, _) = resolve_range(PlotRange::Cross, &ctx, Interval::new(-1.0, 1.0), |x| x);
        assert!(lo.abs() < 1e-3);
    }

    #[test]
    fn visible_and_fit_keywords() {
        assert_eq!(resolve_range(PlotRange::Visible, &ctx(), Interval::new(1.0, 9.0), |x| x), (0.0, 10.0));
        assert_eq!(resolve_range(PlotRange::Fit, &ctx(), Interval::new(1.0, 9.0), |x| x), (1.0, 9.0));
    }

    #[test]
    fn deserializes_every_form() {
        let r: PlotRange = serde_json::from_str("\"cross\"").unwrap();
        assert_eq!(r, PlotRange::Cross);
        let r: PlotRange = serde_json::from_str("[1.5, {\"cross\": 2.0}]").unwrap();
        assert_eq!(r, PlotRange::Pair(Endpoint::Value(1.5), Endpoint::Cross { target: 2.0 }));
        let r: PlotRange = serde_json::from_str("[\"fit\", \"cross\"]").unwrap();
        assert_eq!(r, PlotRange::Pair(Endpoint::Fit, Endpoint::Cross { target: 0.0 }));
    }
}
