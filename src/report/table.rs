//! LaTeX parameter table (booktabs + siunitx).
//!
//! Each fit occupies two columns (label, value). Fits with fewer rows leave
//! empty cells; the grid is (max rows) × (fits) and is serialised row by row.

use crate::domain::{DerivedQuantity, GoodnessOfFit, ModelFamily, SymbolicLabels, TableEntry, TableRow};

use super::format::format_value_error;

pub const CHI_SQUARED_LABEL: &str = "\\chi^2 / \\mathrm{DoF}";
pub const R_SQUARED_LABEL: &str = "R^2";

/// Column titles of the label/value pair under every fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTitles {
    pub label: String,
    pub value: String,
}

impl Default for ColumnTitles {
    fn default() -> Self {
        Self {
            label: "Fitparameter".to_string(),
            value: "Wert".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamTable {
    entries: Vec<TableEntry>,
    titles: ColumnTitles,
}

impl ParamTable {
    /// Table over `entries` in caller order.
    pub fn from_entries(entries: &[TableEntry]) -> Self {
        Self {
            entries: entries.to_vec(),
            titles: ColumnTitles::default(),
        }
    }

    pub fn with_titles(mut self, titles: ColumnTitles) -> Self {
        self.titles = titles;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Full `table` environment, one line per `\n`.
    pub fn to_latex(&self) -> String {
        let mut lines = self.header();
        lines.extend(self.body());
        lines.push("\\bottomrule".to_string());
        lines.push("\\end{tabular}".to_string());
        lines.push("\\end{table}".to_string());

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn header(&self) -> Vec<String> {
        let alignment = format!("@{{}} {}@{{}}", "l l ".repeat(self.entries.len()));
        let names: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("\\multicolumn{{2}}{{c}}{{{}}}", e.name))
            .collect();
        let funcs: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("\\multicolumn{{2}}{{c}}{{${}$}}", e.function))
            .collect();
        let titles: Vec<String> = self
            .entries
            .iter()
            .map(|_| format!("{} & {}", self.titles.label, self.titles.value))
            .collect();

        vec![
            "\\begin{table}[H]".to_string(),
            "\\centering".to_string(),
            format!("\\begin{{tabular}}{{{alignment}}}"),
            "\\toprule".to_string(),
            format!("{} \\\\", names.join(" & ")),
            format!("{} \\\\", funcs.join(" & ")),
            self.rule_line(),
            format!("{} \\\\", titles.join(" & ")),
            "\\midrule".to_string(),
        ]
    }

    /// `\cmidrule(lr){a-b} ...` without trimming on the outer edges.
    fn rule_line(&self) -> String {
        let n = self.entries.len();
        (0..n)
            .map(|i| {
                let trim = match (i == 0, i + 1 == n) {
                    (true, true) => "",
                    (true, false) => "r",
                    (false, true) => "l",
                    (false, false) => "lr",
                };
                format!("\\cmidrule({trim}){{{}-{}}} ", 2 * i + 1, 2 * i + 2)
            })
            .collect()
    }

    fn body(&self) -> Vec<String> {
        let rows = self.entries.iter().map(|e| e.rows.len()).max().unwrap_or(0);
        (0..rows).map(|i| self.serialise_row(i)).collect()
    }

    fn serialise_row(&self, i: usize) -> String {
        let mut line = String::new();
        let mut gaps = 0;
        for entry in &self.entries {
            match entry.rows.get(i) {
                Some(row) => {
                    line.push_str(&" & & ".repeat(gaps));
                    gaps = 0;
                    line.push_str(&format!("${}$ & $\\num{{{}}}$ & ", row.label, format_cell(row)));
                }
                None => gaps += 1,
            }
        }
        line.push_str(&" & &".repeat(gaps));
        let cut = line.len().saturating_sub(2);
        line.truncate(cut);
        line.push_str(" \\\\");
        line
    }
}

fn format_cell(row: &TableRow) -> String {
    if row.label == CHI_SQUARED_LABEL || row.label == R_SQUARED_LABEL {
        format_value_error(row.value, 0.0)
    } else {
        format_value_error(row.value, row.uncertainty)
    }
}

/// Rows of one fit: parameters, then `χ²/DoF` when y-uncertainties were
/// present, then adjusted `R²` for linear/exponential families, then the
/// derived quantities.
pub fn build_table_entry(
    name: &str,
    labels: &SymbolicLabels,
    params: &[f64],
    errors: &[f64],
    gof: &GoodnessOfFit,
    family: ModelFamily,
    derived: &[DerivedQuantity],
) -> TableEntry {
    let mut rows: Vec<TableRow> = labels
        .params
        .iter()
        .zip(params.iter().zip(errors))
        .map(|(label, (v, e))| TableRow {
            label: label.clone(),
            value: *v,
            uncertainty: *e,
        })
        .collect();

    if let Some(chi) = gof.reduced_chi_squared {
        rows.push(TableRow {
            label: CHI_SQUARED_LABEL.to_string(),
            value: chi,
            uncertainty: 0.0,
        });
    }
    if family.reports_r_squared() {
        if let Some(adj) = gof.adj_r_squared {
            rows.push(TableRow {
                label: R_SQUARED_LABEL.to_string(),
                value: adj,
                uncertainty: 0.0,
            });
        }
    }
    rows.extend(derived.iter().map(|q| TableRow {
        label: q.label.clone(),
        value: q.value,
        uncertainty: q.uncertainty,
    }));

    TableEntry {
        name: name.to_string(),
        function: labels.function.clone(),
        rows,
    }
}
