//! LaTeX table output.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Stage};
use crate::report::ParamTable;

/// File name of the LaTeX table inside the output directory.
pub const TABLE_FILE: &str = "plot.tex";

/// Write `table` to `<dir>/plot.tex`, creating `dir` if needed.
pub fn write_latex_table(dir: &Path, table: &ParamTable) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(Stage::Output, format!("failed to create '{}': {e}", dir.display())))?;
    let path = dir.join(TABLE_FILE);
    fs::write(&path, table.to_latex())
        .map_err(|e| AppError::io(Stage::Output, format!("failed to write '{}': {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TableEntry, TableRow};

    #[test]
    fn writes_plot_tex() {
        let dir = std::env::temp_dir().join(format!("ezfit-table-{}", std::process::id()));
        let table = ParamTable::from_entries(&[TableEntry {
            name: "Fit".to_string(),
            function: "f".to_string(),
            rows: vec![TableRow {
                label: "A".to_string(),
                value: 1.5,
                uncertainty: 0.0,
            }],
        }]);
        let path = write_latex_table(&dir, &table).unwrap();
        assert!(path.ends_with(TABLE_FILE));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, table.to_latex());
        let _ = fs::remove_dir_all(&dir);
    }
}
