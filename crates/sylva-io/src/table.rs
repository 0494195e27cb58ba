//! Shared CSV loading for the dataset and results readers.

use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::IoError;

/// A CSV file held in memory: header plus rectangular data rows.
#[derive(Debug)]
pub(crate) struct CsvTable {
    pub(crate) header: StringRecord,
    pub(crate) rows: Vec<StringRecord>,
}

impl CsvTable {
    /// Zero-based position of the named column.
    pub(crate) fn column(&self, path: &Path, name: &str) -> Result<usize, IoError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| IoError::UnknownColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    }
}

fn csv_error(path: &Path, source: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: source.position().map_or(0, |p| p.byte()),
        source,
    }
}

/// Read a headed CSV file, rejecting ragged rows and files without data.
pub(crate) fn read_table(path: &Path) -> Result<CsvTable, IoError> {
    let file = std::fs::File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;

    // flexible(true) lets the row-length check below report the row instead
    // of a low-level CsvParse error.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let header = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
    let expected = header.len();
    debug!(expected_cols = expected, "read CSV header");

    let mut rows = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_error(path, e))?;
        if record.len() != expected {
            return Err(IoError::InconsistentRowLength {
                path: path.to_path_buf(),
                row_index,
                expected,
                got: record.len(),
            });
        }
        rows.push(record);
    }

    if rows.is_empty() {
        return Err(IoError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }
    Ok(CsvTable { header, rows })
}
