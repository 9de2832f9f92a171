//! Number formatting and console summaries.
//!
//! `format_value_error` renders a value with its uncertainty in the compact
//! `value(digits)` notation understood by siunitx, e.g. `123.46(79)` or
//! `1.23457(57)e+07`. The general-notation helper follows the `g`
//! presentation of C printf / Python format strings so tables stay stable
//! against the reference output.

use crate::domain::{DerivedQuantity, FitOutcome, GoodnessOfFit};

/// General (`g`) notation with `precision` significant digits.
///
/// Scientific notation is used when the decimal exponent is below −4 or at
/// least `precision`. Without `alternate` trailing zeros and a bare decimal
/// point are removed; with it they are kept and a decimal point is always
/// present.
pub fn format_general(v: f64, precision: usize, alternate: bool) -> String {
    if !v.is_finite() {
        return non_finite(v);
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };

    if exp < -4 || exp >= p as i32 {
        let mut m = mantissa;
        if alternate {
            if !m.contains('.') {
                m.push('.');
            }
        } else {
            m = strip_trailing_zeros(&m);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{m}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let mut s = format!("{v:.decimals$}");
        if alternate {
            if !s.contains('.') {
                s.push('.');
            }
        } else {
            s = strip_trailing_zeros(&s);
        }
        s
    }
}

/// Value with uncertainty in `value(digits)` notation.
///
/// The uncertainty is shown with two significant digits and the value is
/// rounded to the same decimal place. A zero uncertainty prints the value
/// alone with 0, 1 or 2 decimals for `|v| > 10`, `|v| > 1` and smaller values.
pub fn format_value_error(v: f64, e: f64) -> String {
    if !v.is_finite() {
        return non_finite(v);
    }
    if !e.is_finite() {
        return format!("{}({})", format_general(v, 6, false), non_finite(e));
    }
    let e = e.abs();

    if e == 0.0 {
        let decimals = if v.abs() > 10.0 {
            0
        } else if v.abs() > 1.0 {
            1
        } else {
            2
        };
        return format!("{v:.decimals$}");
    }
    if v == 0.0 {
        return format_zero_value(e);
    }

    let pot_value = v.abs().log10().floor() as i32;
    let pot_error = e.log10().floor() as i32;
    let mut sig = 2 + (pot_value - pot_error);
    let mut sig_err = 2;
    if sig < 2 {
        sig = 1;
        sig_err = 1 + (pot_value - pot_error).abs();
    }

    let mut value = format_general(v, sig as usize, sig != 1);
    if value.ends_with('.') {
        value.pop();
    }

    let error = format_general(e, sig_err as usize, true).replace('.', "");
    let error = error.split('e').next().unwrap_or("").trim_start_matches('0').to_string();

    match value.find('e') {
        Some(idx) => format!("{}({error}){}", &value[..idx], &value[idx..]),
        None => format!("{value}({error})"),
    }
}

/// `0(digits)` with the value's decimals at the error's second significant digit.
fn format_zero_value(e: f64) -> String {
    let decimals = 1 - e.log10().floor() as i32;
    let digits = (e * 10f64.powi(decimals)).round() as u64;
    if decimals >= 0 {
        let d = decimals as usize;
        format!("{:.d$}({digits})", 0.0)
    } else {
        format!("0({})", digits * 10u64.pow(decimals.unsigned_abs()))
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn non_finite(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn g10(v: f64) -> String {
    format_general(v, 10, false)
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// Console summary of one fit: parameters, statistics, derived quantities.
pub fn format_fit_summary(
    name: Option<&str>,
    param_names: &[String],
    outcome: &FitOutcome,
    gof: &GoodnessOfFit,
    derived: &[DerivedQuantity],
    print_residuals: bool,
) -> String {
    let mut out = String::new();
    if let Some(name) = name {
        out.push_str(&format!("{name}:\n"));
    }

    let result = &outcome.result;
    out.push_str("      Parameters:\n");
    for ((p, v), e) in param_names.iter().zip(&result.params).zip(&result.errors) {
        out.push_str(&format!("            {p} = {} +- {}\n", g10(*v), g10(*e)));
    }

    let diag = &outcome.diagnostics;
    out.push_str(&format!(
        "      Solver: {}{} | iterations={} | evaluations={} | termination={:?}\n",
        diag.method.display_name(),
        if diag.robust { " (robust)" } else { "" },
        diag.iterations,
        diag.evaluations,
        diag.termination,
    ));

    if let Some(cv) = &gof.cross_validation {
        out.push_str(&format!(
            "      Cross Validation RMSE: {} ({}/{} refits)\n",
            fmt_opt(cv.rmse),
            cv.succeeded,
            cv.attempted
        ));
    }
    out.push_str(&format!("      RMSE: {}\n", gof.rmse));
    out.push_str(&format!("      R-squared: {}\n", gof.r_squared));
    out.push_str(&format!("      Adjusted R-squared: {}\n", fmt_opt(gof.adj_r_squared)));
    if gof.chi_squared.is_some() {
        out.push_str(&format!("      Chi-squared: {}\n", fmt_opt(gof.chi_squared)));
        out.push_str(&format!("      Reduced Chi-squared: {}\n", fmt_opt(gof.reduced_chi_squared)));
    }

    if print_residuals {
        let title = if gof.residuals_normalized { "Normalized Residuals" } else { "Residuals" };
        out.push_str(&format!("      ----------{title}----------\n"));
        for r in &gof.residuals {
            out.push_str(&format!("      {r}\n"));
        }
        out.push_str(&format!("      {:-<1$}\n", "", title.len() + 20));
    }

    for q in derived {
        out.push_str(&format!("      {}: {} +- {}\n", q.name, g10(q.value), g10(q.uncertainty)));
    }
    out
}
