//! Built-in model catalog.
//!
//! Names are matched exactly. Every peak composite
//! `[Double]{Voigt|SkewedGauss}Under[Fix][Linear]` is listed with an explicit
//! `PeakFamily` descriptor, so derived quantities never depend on substrings of
//! a model name.

use crate::domain::{Baseline, ModelFamily, PeakFamily, PeakShape};

use super::model::{BuiltinKind, Model};

/// Look up a built-in model by name.
pub fn lookup(name: &str) -> Option<Model> {
    simple_models()
        .into_iter()
        .chain(peak_composites())
        .find(|m| m.name() == name)
}

/// Names of every built-in model, simple models first.
pub fn catalog_names() -> Vec<String> {
    simple_models()
        .into_iter()
        .chain(peak_composites())
        .map(|m| m.name().to_string())
        .collect()
}

fn simple_models() -> Vec<Model> {
    let single_voigt = PeakFamily {
        shape: PeakShape::Voigt,
        doubled: false,
        fixed_width: false,
        baseline: Baseline::None,
    };
    let single_skew = PeakFamily {
        shape: PeakShape::SkewGauss,
        ..single_voigt
    };

    vec![
        Model::builtin("Linear", &["A", "B"], ModelFamily::Linear, BuiltinKind::Linear),
        Model::builtin("Quadratic", &["a", "b", "c"], ModelFamily::Generic, BuiltinKind::Quadratic),
        Model::builtin("ExpFit", &["A", "k"], ModelFamily::Exponential, BuiltinKind::ExpFit),
        Model::builtin("FallingExpFit", &["A", "k"], ModelFamily::Exponential, BuiltinKind::FallingExpFit),
        Model::builtin("GaussPDF", &["A", "SD", "EV"], ModelFamily::Generic, BuiltinKind::GaussPdf),
        Model::builtin("GaussCDF", &["A", "SD", "EV"], ModelFamily::Generic, BuiltinKind::GaussCdf),
        Model::builtin("MinusGaussCDF", &["A", "SD", "EV"], ModelFamily::Generic, BuiltinKind::MinusGaussCdf),
        Model::builtin(
            "SkewedGaussPDF",
            &["A", "gSD", "gEV", "shape"],
            ModelFamily::Peak(single_skew),
            BuiltinKind::Peak(single_skew),
        ),
        Model::builtin(
            "Voigt",
            &["A", "SD", "EV", "Gamma"],
            ModelFamily::Peak(single_voigt),
            BuiltinKind::Peak(single_voigt),
        ),
        Model::builtin("RutherfordFit", &["a", "x_0"], ModelFamily::Generic, BuiltinKind::Rutherford),
    ]
}

fn peak_composites() -> Vec<Model> {
    let mut out = Vec::new();
    for shape in [PeakShape::Voigt, PeakShape::SkewGauss] {
        for doubled in [false, true] {
            let widths: &[bool] = match shape {
                PeakShape::Voigt => &[false, true],
                PeakShape::SkewGauss => &[false],
            };
            for &fixed_width in widths {
                for baseline in [Baseline::Quadratic, Baseline::Linear] {
                    let family = PeakFamily {
                        shape,
                        doubled,
                        fixed_width,
                        baseline,
                    };
                    out.push(Model::builtin(
                        composite_name(&family),
                        &composite_params(&family).iter().map(String::as_str).collect::<Vec<_>>(),
                        ModelFamily::Peak(family),
                        BuiltinKind::Peak(family),
                    ));
                }
            }
        }
    }
    out
}

fn composite_name(family: &PeakFamily) -> String {
    let shape = match family.shape {
        PeakShape::Voigt => "Voigt",
        PeakShape::SkewGauss => "SkewedGauss",
    };
    format!(
        "{}{shape}Under{}{}",
        if family.doubled { "Double" } else { "" },
        if family.fixed_width { "Fix" } else { "" },
        if family.baseline == Baseline::Linear { "Linear" } else { "" },
    )
}

fn composite_params(family: &PeakFamily) -> Vec<String> {
    let block: &[&str] = match (family.shape, family.fixed_width) {
        (PeakShape::Voigt, false) => &["A", "SD", "EV", "Gamma"],
        (PeakShape::Voigt, true) => &["A", "SD", "EV"],
        (PeakShape::SkewGauss, _) => &["A", "gSD", "gEV", "shape"],
    };
    let mut params = Vec::with_capacity(family.param_count());
    for i in 1..=family.peak_count() {
        for name in block {
            if family.doubled {
                params.push(format!("{name}{i}"));
            } else {
                params.push(name.to_string());
            }
        }
    }
    let baseline: &[&str] = match family.baseline {
        Baseline::None => &[],
        Baseline::Linear => &["a", "b"],
        Baseline::Quadratic => &["a", "b", "c"],
    };
    params.extend(baseline.iter().map(|s| s.to_string()));
    params
}
