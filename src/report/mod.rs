//! Reporting: value/uncertainty formatting, console summaries and the LaTeX
//! parameter table.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns; the CLI only prints the strings built in this module.

pub mod format;
pub mod table;

pub use format::{format_fit_summary, format_general, format_value_error};
pub use table::{build_table_entry, ColumnTitles, ParamTable, CHI_SQUARED_LABEL, R_SQUARED_LABEL};
