//! Labeled dataset reader with categorical encoding.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::domain::LabeledDataset;
use crate::table::{CsvTable, read_table};
use crate::IoError;

/// Reads a classification dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - One column is the target (the last one unless [`with_target`] names another)
/// - Every other column is a feature
///
/// A feature column whose cells all parse as numbers is read as-is. Any
/// other column is categorical: its distinct values are sorted and each cell
/// is replaced by the position of its value. Target values are mapped the
/// same way, sorting numerically when every label is a number.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::UnknownColumn`] | Named target is not in the header |
/// | [`IoError::NoFeatureColumns`] | Only the target column is present |
/// | [`IoError::MissingValue`] | A cell is empty |
/// | [`IoError::NonFiniteValue`] | A numeric cell is NaN or infinite |
///
/// [`with_target`]: DatasetReader::with_target
pub struct DatasetReader {
    path: PathBuf,
    target: Option<String>,
}

/// Column values after encoding, plus whether they came from text.
struct EncodedColumn {
    values: Vec<f64>,
    categorical: bool,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            target: None,
        }
    }

    /// Use the named column as the target instead of the last column.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Read, validate and encode the CSV file.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<LabeledDataset, IoError> {
        let table = read_table(&self.path)?;
        let n_cols = table.header.len();

        let target_col = match &self.target {
            Some(name) => table.column(&self.path, name)?,
            None => n_cols.saturating_sub(1),
        };
        if n_cols < 2 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        self.check_missing(&table)?;

        let (labels, class_names) = encode_labels(&table, target_col);

        let mut feature_names = Vec::with_capacity(n_cols - 1);
        let mut columns = Vec::with_capacity(n_cols - 1);
        let mut categorical_columns = Vec::new();
        for (col, name) in table.header.iter().enumerate() {
            if col == target_col {
                continue;
            }
            let encoded = self.encode_feature(&table, col)?;
            if encoded.categorical {
                debug!(column = name, "encoded categorical column");
                categorical_columns.push(name.to_string());
            }
            feature_names.push(name.to_string());
            columns.push(encoded.values);
        }

        let features: Vec<Vec<f64>> = (0..table.rows.len())
            .map(|row| columns.iter().map(|c| c[row]).collect())
            .collect();

        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            n_classes = class_names.len(),
            n_categorical = categorical_columns.len(),
            target = &table.header[target_col],
            "dataset loaded"
        );

        Ok(LabeledDataset::new(
            feature_names,
            features,
            labels,
            class_names,
            categorical_columns,
        ))
    }

    fn check_missing(&self, table: &CsvTable) -> Result<(), IoError> {
        for (row_index, record) in table.rows.iter().enumerate() {
            if let Some(col) = record.iter().position(str::is_empty) {
                return Err(IoError::MissingValue {
                    path: self.path.clone(),
                    row_index,
                    column: table.header[col].to_string(),
                });
            }
        }
        Ok(())
    }

    fn encode_feature(&self, table: &CsvTable, col: usize) -> Result<EncodedColumn, IoError> {
        let parsed: Option<Vec<f64>> = table
            .rows
            .iter()
            .map(|r| r[col].parse::<f64>().ok())
            .collect();

        let Some(values) = parsed else {
            let codes = index_of(table.rows.iter().map(|r| &r[col]).collect::<BTreeSet<_>>());
            let values = table.rows.iter().map(|r| codes[&r[col]] as f64).collect();
            return Ok(EncodedColumn {
                values,
                categorical: true,
            });
        };

        if let Some(row_index) = values.iter().position(|v| !v.is_finite()) {
            return Err(IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: table.header[col].to_string(),
                raw: table.rows[row_index][col].to_string(),
            });
        }
        Ok(EncodedColumn {
            values,
            categorical: false,
        })
    }
}

/// Position of each value in iteration order.
fn index_of<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<&'a str, usize> {
    values.into_iter().enumerate().map(|(i, v)| (v, i)).collect()
}

/// Map label text to class indices over the sorted distinct values.
fn encode_labels(table: &CsvTable, col: usize) -> (Vec<usize>, Vec<String>) {
    let distinct: BTreeSet<&str> = table.rows.iter().map(|r| &r[col]).collect();

    let numeric: Option<Vec<(f64, &str)>> = distinct
        .iter()
        .map(|&c| c.parse::<f64>().ok().map(|v| (v, c)))
        .collect();
    let classes: Vec<&str> = match numeric {
        Some(mut pairs) => {
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            pairs.into_iter().map(|(_, c)| c).collect()
        }
        None => distinct.into_iter().collect(),
    };

    let codes = index_of(classes.iter().copied());
    let labels = table.rows.iter().map(|r| codes[&r[col]]).collect();
    let class_names = classes.into_iter().map(String::from).collect();
    (labels, class_names)
}
