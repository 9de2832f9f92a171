//! Delimited-text ingest.
//!
//! Turns a CSV-like file into a `DataSet` with one `Series` per y column.
//!
//! - configurable separator and decimal character
//! - empty or unparseable cells become NaN (NaN `y` is dropped later by the
//!   preprocessor)
//! - a single x column is shared by every y column
//! - error columns are a column name, a constant, or `"[NULL]"` (absent)

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use csv::StringRecord;
use tracing::debug;

use crate::config::{DataSource, ErrorColumn};
use crate::domain::{DataSet, Series, Uncertainty};
use crate::error::{AppError, Stage};

/// Load the data set described by `source`.
pub fn load_dataset(source: &DataSource) -> Result<DataSet, AppError> {
    let file = File::open(&source.path).map_err(|e| {
        AppError::io(
            Stage::Ingest,
            format!("failed to open data file '{}': {e}", source.path.display()),
        )
    })?;
    read_dataset(file, source)
}

/// Parse delimited text from any reader.
pub fn read_dataset<R: Read>(reader: R, source: &DataSource) -> Result<DataSet, AppError> {
    if !source.separator.is_ascii() {
        return Err(AppError::invalid(
            Stage::Ingest,
            format!("separator '{}' is not an ASCII character", source.separator),
        ));
    }
    if source.x_columns.is_empty() || source.y_columns.is_empty() {
        return Err(AppError::invalid(Stage::Ingest, "at least one x and one y column are required"));
    }
    if source.x_columns.len() != 1 && source.x_columns.len() != source.y_columns.len() {
        return Err(AppError::invalid(
            Stage::Ingest,
            format!(
                "{} x columns for {} y columns (expected 1 or {})",
                source.x_columns.len(),
                source.y_columns.len(),
                source.y_columns.len()
            ),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(source.separator as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(Stage::Ingest, format!("failed to read headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| AppError::io(Stage::Ingest, format!("line {}: {e}", idx + 2)))?;
        records.push(record);
    }
    debug!(rows = records.len(), columns = headers.len(), "read data file");

    let column = |name: &str| -> Result<Vec<f64>, AppError> {
        let idx = *header_map
            .get(name)
            .ok_or_else(|| AppError::invalid(Stage::Ingest, format!("missing column '{name}'")))?;
        Ok(records
            .iter()
            .map(|r| parse_cell(r.get(idx).unwrap_or(""), source.decimal))
            .collect())
    };

    let mut series = Vec::with_capacity(source.y_columns.len());
    for (i, y_name) in source.y_columns.iter().enumerate() {
        let x_name = source.x_columns.get(i).unwrap_or(&source.x_columns[0]);
        series.push(Series {
            x: column(x_name)?,
            y: column(y_name)?,
            x_err: uncertainty(source.x_error_columns.get(i), &column)?,
            y_err: uncertainty(source.y_error_columns.get(i), &column)?,
        });
    }

    Ok(DataSet { series })
}

fn uncertainty<F>(spec: Option<&ErrorColumn>, column: &F) -> Result<Uncertainty, AppError>
where
    F: Fn(&str) -> Result<Vec<f64>, AppError>,
{
    Ok(match spec {
        None => Uncertainty::Absent,
        Some(ErrorColumn::Value(v)) => Uncertainty::Scalar(*v),
        Some(ErrorColumn::Column(name)) if name == ErrorColumn::NULL_MARKER => Uncertainty::Absent,
        Some(ErrorColumn::Column(name)) => Uncertainty::PerPoint(column(name)?),
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_string(), idx))
        .collect()
}

fn parse_cell(raw: &str, decimal: char) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return f64::NAN;
    }
    let parsed = if decimal == '.' {
        raw.parse::<f64>()
    } else {
        raw.replace(decimal, ".").parse::<f64>()
    };
    parsed.unwrap_or(f64::NAN)
}
