//! Hyperparameter-search results: reading, best-row selection and
//! conversion of a configuration into forest hyperparameters.

use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, Serializer};
use sylva_rf::{Hyperparameters, SplitCriterion};
use tracing::{debug, info, instrument, warn};

use crate::table::read_table;
use crate::IoError;

/// Prefix some search tools put in front of parameter column names.
const PARAM_PREFIX: &str = "p:";

/// Reads a search results CSV.
///
/// Every column before the objective column is a hyperparameter; columns
/// after it (elapsed time, job id, ...) are bookkeeping and are ignored.
pub struct ResultsReader {
    path: PathBuf,
    objective: String,
}

/// One hyperparameter configuration: ordered `(name, raw value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    params: Vec<(String, String)>,
}

/// The configuration with the highest objective in a results table.
#[derive(Debug, Clone)]
pub struct BestConfiguration {
    row_index: usize,
    objective: f64,
    configuration: Configuration,
}

/// All evaluated configurations of a search.
#[derive(Debug)]
pub struct ResultsTable {
    path: PathBuf,
    objective_column: String,
    configurations: Vec<Configuration>,
    objectives: Vec<Option<f64>>,
}

impl ResultsReader {
    /// Create a reader that ranks rows by the `objective` column.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            objective: "objective".to_string(),
        }
    }

    /// Rank rows by a differently named column.
    #[must_use]
    pub fn with_objective_column(mut self, name: impl Into<String>) -> Self {
        self.objective = name.into();
        self
    }

    /// Read the results file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
    /// | [`IoError::CsvParse`] | Malformed CSV record |
    /// | [`IoError::EmptyDataset`] | Zero data rows after header |
    /// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
    /// | [`IoError::UnknownColumn`] | Objective column is not in the header |
    #[instrument(skip(self), fields(path = %self.path.display(), objective = %self.objective))]
    pub fn read(&self) -> Result<ResultsTable, IoError> {
        let table = read_table(&self.path)?;
        let objective_col = table.column(&self.path, &self.objective)?;

        let names: Vec<String> = table
            .header
            .iter()
            .take(objective_col)
            .map(|h| h.strip_prefix(PARAM_PREFIX).unwrap_or(h).to_string())
            .collect();

        let mut configurations = Vec::with_capacity(table.rows.len());
        let mut objectives = Vec::with_capacity(table.rows.len());
        for (row_index, record) in table.rows.iter().enumerate() {
            let raw = &record[objective_col];
            let objective = raw.parse::<f64>().ok().filter(|v| v.is_finite());
            if objective.is_none() {
                debug!(row_index, raw, "skipping row without a finite objective");
            }
            objectives.push(objective);
            configurations.push(Configuration {
                params: names
                    .iter()
                    .cloned()
                    .zip(record.iter().map(String::from))
                    .collect(),
            });
        }

        let n_failed = objectives.iter().filter(|o| o.is_none()).count();
        if n_failed > 0 {
            warn!(n_failed, "rows with non-finite objective ignored");
        }
        info!(
            n_rows = configurations.len(),
            n_params = names.len(),
            "search results loaded"
        );

        Ok(ResultsTable {
            path: self.path.clone(),
            objective_column: self.objective.clone(),
            configurations,
            objectives,
        })
    }
}

impl ResultsTable {
    /// Number of rows, including those without a usable objective.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Configuration of row `index`.
    #[must_use]
    pub fn configuration(&self, index: usize) -> Option<&Configuration> {
        self.configurations.get(index)
    }

    /// Objective of row `index`; `None` when the row has no finite objective.
    #[must_use]
    pub fn objective(&self, index: usize) -> Option<f64> {
        self.objectives.get(index).copied().flatten()
    }

    /// Select the row with the highest objective.
    ///
    /// Rows without a finite objective are skipped. Ties go to the earliest row.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::NoValidObjective`] if no row has a finite objective.
    pub fn best(&self) -> Result<BestConfiguration, IoError> {
        let mut best: Option<(usize, f64)> = None;
        for (i, objective) in self.objectives.iter().enumerate() {
            let Some(value) = *objective else { continue };
            if best.is_none_or(|(_, b)| value > b) {
                best = Some((i, value));
            }
        }

        let (row_index, objective) = best.ok_or_else(|| IoError::NoValidObjective {
            path: self.path.clone(),
            column: self.objective_column.clone(),
        })?;
        debug!(row_index, objective, "best configuration selected");

        Ok(BestConfiguration {
            row_index,
            objective,
            configuration: self.configurations[row_index].clone(),
        })
    }
}

impl BestConfiguration {
    /// Zero-based data row the configuration came from.
    #[must_use]
    pub fn row_index(&self) -> usize {
        self.row_index
    }

    /// The objective value that made this row the best.
    #[must_use]
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// The winning configuration.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

impl Configuration {
    /// Raw value of the named parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(name, raw value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Interpret the configuration as random-forest hyperparameters.
    ///
    /// Reads `n_estimators`, `criterion`, `max_depth` and
    /// `min_samples_split`; other columns are ignored. Counts may be written
    /// as integral floats (`10.0`). An empty `max_depth`, or one spelled
    /// `None`, `null` or `nan`, means unlimited depth.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingParameter`] | a required column is absent |
    /// | [`IoError::InvalidParameter`] | a value cannot be interpreted |
    pub fn hyperparameters(&self) -> Result<Hyperparameters, IoError> {
        let criterion_raw = self.require("criterion")?;
        let criterion: SplitCriterion =
            criterion_raw
                .parse()
                .map_err(|e: sylva_rf::RfError| IoError::InvalidParameter {
                    name: "criterion",
                    raw: criterion_raw.to_string(),
                    reason: e.to_string(),
                })?;

        let max_depth_raw = self.require("max_depth")?;
        let max_depth = match max_depth_raw.to_ascii_lowercase().as_str() {
            "" | "none" | "null" | "nan" => None,
            _ => Some(parse_count("max_depth", max_depth_raw)?),
        };

        Ok(Hyperparameters {
            n_estimators: parse_count("n_estimators", self.require("n_estimators")?)?,
            criterion,
            max_depth,
            min_samples_split: parse_count("min_samples_split", self.require("min_samples_split")?)?,
        })
    }

    fn require(&self, name: &'static str) -> Result<&str, IoError> {
        self.get(name).ok_or(IoError::MissingParameter { name })
    }
}

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.params.len()))?;
        for (name, value) in &self.params {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Parse a non-negative count, accepting integral floats such as `10.0`.
fn parse_count(name: &'static str, raw: &str) -> Result<usize, IoError> {
    let invalid = |reason: &str| IoError::InvalidParameter {
        name,
        raw: raw.to_string(),
        reason: reason.to_string(),
    };
    if let Ok(n) = raw.parse::<usize>() {
        return Ok(n);
    }
    let value: f64 = raw.parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(invalid("expected a non-negative integer"));
    }
    if value > usize::MAX as f64 {
        return Err(invalid("too large"));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::write_csv;

    const RESULTS: &str = "\
criterion,max_depth,min_samples_split,n_estimators,objective,elapsed_sec
gini,10,4,100,0.61,12.5
entropy,,2,50.0,0.64,20.1
gini,5,3,10,F_failed,3.0
entropy,20,8,200,0.64,30.2
";

    fn read(content: &str) -> ResultsTable {
        let f = write_csv(content);
        ResultsReader::new(f.path()).read().unwrap()
    }

    #[test]
    fn best_is_first_maximum() {
        let table = read(RESULTS);
        assert_eq!(table.len(), 4);
        let best = table.best().unwrap();
        assert_eq!(best.row_index(), 1);
        assert!((best.objective() - 0.64).abs() < f64::EPSILON);
    }

    #[test]
    fn best_is_idempotent() {
        let table = read(RESULTS);
        let a = table.best().unwrap();
        let b = table.best().unwrap();
        assert_eq!(a.row_index(), b.row_index());
        assert_eq!(a.configuration(), b.configuration());
    }

    #[test]
    fn best_matches_labeled_maximum() {
        let table = read(RESULTS);
        let best = table.best().unwrap();
        let max = (0..table.len())
            .filter_map(|i| table.objective(i))
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(table.objective(best.row_index()), Some(max));
    }

    #[test]
    fn trailing_columns_are_not_parameters() {
        let table = read(RESULTS);
        let config = table.best().unwrap().configuration().clone();
        let names: Vec<&str> = config.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["criterion", "max_depth", "min_samples_split", "n_estimators"]
        );
        assert_eq!(config.get("elapsed_sec"), None);
    }

    #[test]
    fn failed_rows_are_skipped() {
        let table = read(RESULTS);
        assert_eq!(table.objective(2), None);
        assert!(table.configuration(2).is_some());
    }

    #[test]
    fn hyperparameters_from_best_row() {
        let table = read(RESULTS);
        let hp = table.best().unwrap().configuration().hyperparameters().unwrap();
        assert_eq!(
            hp,
            Hyperparameters {
                n_estimators: 50,
                criterion: SplitCriterion::Entropy,
                max_depth: None,
                min_samples_split: 2,
            }
        );
    }

    #[test]
    fn prefixed_parameter_names() {
        let table = read("p:criterion,p:max_depth,p:min_samples_split,p:n_estimators,objective\ngini,None,2,30,0.5\n");
        let hp = table.best().unwrap().configuration().hyperparameters().unwrap();
        assert_eq!(hp.n_estimators, 30);
        assert_eq!(hp.max_depth, None);
    }

    #[test]
    fn custom_objective_column() {
        let f = write_csv("criterion,max_depth,min_samples_split,n_estimators,acc\ngini,3,2,5,0.1\ngini,4,2,5,0.2\n");
        let table = ResultsReader::new(f.path())
            .with_objective_column("acc")
            .read()
            .unwrap();
        assert_eq!(table.best().unwrap().row_index(), 1);
    }

    #[test]
    fn missing_objective_column() {
        let f = write_csv("criterion,score\ngini,0.5\n");
        let err = ResultsReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::UnknownColumn { ref column, .. } if column == "objective"));
    }

    #[test]
    fn no_valid_objective() {
        let table = read("criterion,objective\ngini,nan\nentropy,F\n");
        let err = table.best().unwrap_err();
        assert!(matches!(err, IoError::NoValidObjective { .. }));
    }

    #[test]
    fn missing_parameter() {
        let table = read("criterion,max_depth,n_estimators,objective\ngini,3,10,0.5\n");
        let err = table.best().unwrap().configuration().hyperparameters().unwrap_err();
        assert!(matches!(err, IoError::MissingParameter { name: "min_samples_split" }));
    }

    #[test]
    fn invalid_parameters() {
        for row in [
            "gini,3,2,ten,0.5",
            "gini,3,2.5,10,0.5",
            "gini,-3,2,10,0.5",
            "mse,3,2,10,0.5",
        ] {
            let table = read(&format!(
                "criterion,max_depth,min_samples_split,n_estimators,objective\n{row}\n"
            ));
            let err = table.best().unwrap().configuration().hyperparameters().unwrap_err();
            assert!(matches!(err, IoError::InvalidParameter { .. }), "{row}");
        }
    }

    #[test]
    fn parse_count_accepts_integral_floats() {
        assert_eq!(parse_count("n", "12").unwrap(), 12);
        assert_eq!(parse_count("n", "12.0").unwrap(), 12);
        assert!(parse_count("n", "1e400").is_err());
    }

    #[test]
    fn configuration_serializes_in_column_order() {
        let table = read(RESULTS);
        let json = serde_json::to_string(table.best().unwrap().configuration()).unwrap();
        assert_eq!(
            json,
            r#"{"criterion":"entropy","max_depth":"","min_samples_split":"2","n_estimators":"50.0"}"#
        );
    }
}
