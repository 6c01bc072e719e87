//! CSV-backed provider.
//!
//! Each split lives in `<dir>/<split>.csv`. The header starts with the
//! `datetime` and `instrument` columns; every column whose name starts with
//! `label` (any case) is a label horizon, every other column is a feature.
//! Empty cells and `nan` parse as NaN.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DataError, DataResult};
use crate::frame::{RowKey, Split, SplitFrame};
use crate::provider::DataProvider;

/// Name of the date column.
pub const DATE_COLUMN: &str = "datetime";
/// Name of the instrument column.
pub const INSTRUMENT_COLUMN: &str = "instrument";

/// Reads splits from CSV files in one directory.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    /// Creates a provider reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the split files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `split`.
    pub fn split_path(&self, split: Split) -> PathBuf {
        self.dir.join(format!("{}.csv", split.name()))
    }
}

impl DataProvider for CsvProvider {
    fn prepare(&self, split: Split) -> DataResult<SplitFrame> {
        let path = self.split_path(split);
        if !path.exists() {
            return Err(DataError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "split file not found"),
            });
        }
        let frame = read_frame(&path)?;
        info!(
            split = %split,
            rows = frame.len(),
            features = frame.feature_width(),
            horizons = frame.horizons(),
            path = %path.display(),
            "Loaded split"
        );
        Ok(frame)
    }
}

/// Reads one CSV file into a frame, stably ordered by date.
pub fn read_frame(path: &Path) -> DataResult<SplitFrame> {
    let csv_err = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let date_col = position(DATE_COLUMN)?;
    let inst_col = position(INSTRUMENT_COLUMN)?;

    let mut feature_cols = Vec::new();
    let mut label_cols = Vec::new();
    for (col, name) in headers.iter().enumerate() {
        if col == date_col || col == inst_col {
            continue;
        }
        if name.to_ascii_lowercase().starts_with("label") {
            label_cols.push(col);
        } else {
            feature_cols.push(col);
        }
    }
    let label_names: Vec<String> = label_cols.iter().map(|c| headers[*c].to_string()).collect();

    let mut rows: Vec<(RowKey, Vec<f32>, Vec<f32>)> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map_or(0, |p| p.line());
        let cell = |col: usize| -> DataResult<f32> {
            let raw = record.get(col).unwrap_or("").trim();
            parse_cell(raw).ok_or_else(|| DataError::InvalidNumber {
                path: path.to_path_buf(),
                line,
                column: headers[col].to_string(),
                value: raw.to_string(),
            })
        };
        let features = feature_cols.iter().map(|c| cell(*c)).collect::<DataResult<Vec<_>>>()?;
        let labels = label_cols.iter().map(|c| cell(*c)).collect::<DataResult<Vec<_>>>()?;
        let key = (
            record.get(date_col).unwrap_or("").to_string(),
            record.get(inst_col).unwrap_or("").to_string(),
        );
        rows.push((key, features, labels));
    }
    rows.sort_by(|a, b| a.0 .0.cmp(&b.0 .0));

    let mut index = Vec::with_capacity(rows.len());
    let mut features = Vec::with_capacity(rows.len() * feature_cols.len());
    let mut labels = Vec::with_capacity(rows.len() * label_cols.len());
    for (key, f, l) in rows {
        index.push(key);
        features.extend(f);
        labels.extend(l);
    }
    SplitFrame::new(index, features, feature_cols.len(), labels, label_names)
}

fn parse_cell(raw: &str) -> Option<f32> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(f32::NAN);
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell() {
        assert!(parse_cell("").unwrap().is_nan());
        assert!(parse_cell("NaN").unwrap().is_nan());
        assert_eq!(parse_cell("-1.5e-2"), Some(-0.015));
        assert_eq!(parse_cell("abc"), None);
    }
}
