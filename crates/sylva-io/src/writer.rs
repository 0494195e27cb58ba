//! JSON result writer for hold-out evaluations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sylva_rf::{ClassMetrics, HoldoutResult, Hyperparameters, RankedFeature};
use tracing::{debug, info, instrument};

use crate::domain::ExperimentName;
use crate::results::{BestConfiguration, Configuration};
use crate::IoError;

/// Writes evaluation artifacts for one experiment.
///
/// Creates the output directory on construction if it does not exist.
/// The evaluation goes to `{experiment}_evaluate.json`; the fitted model
/// belongs at [`model_path`](Self::model_path).
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Write the evaluation of `best` to `{experiment}_evaluate.json` and
    /// return the file path.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::MissingParameter`] / [`IoError::InvalidParameter`] | `best` does not describe a forest |
    /// | [`IoError::SerializeJson`] | the artifact cannot be encoded |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all)]
    pub fn write_evaluation(
        &self,
        best: &BestConfiguration,
        result: &HoldoutResult,
    ) -> Result<PathBuf, IoError> {
        let path = self
            .output_dir
            .join(format!("{}_evaluate.json", self.experiment.as_str()));

        let (n_train, n_valid, n_test) = result.partition_sizes();
        let confusion = result.confusion_matrix();
        let artifact = EvaluateArtifact {
            experiment: self.experiment.as_str(),
            source_row: best.row_index(),
            objective: best.objective(),
            configuration: best.configuration(),
            hyperparameters: best.configuration().hyperparameters()?,
            accuracy: AccuracyEntry {
                train: result.train_accuracy(),
                valid: result.valid_accuracy(),
                test: result.test_accuracy(),
            },
            partition_sizes: PartitionSizes {
                train: n_train,
                valid: n_valid,
                test: n_test,
            },
            feature_importances: result.importances(),
            n_classes: confusion.n_classes(),
            confusion_matrix: confusion.as_rows(),
            class_metrics: confusion.class_metrics(),
        };

        let json = serde_json::to_string_pretty(&artifact).map_err(|e| IoError::SerializeJson {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        info!(path = %path.display(), "evaluation result written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything; just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct EvaluateArtifact<'a> {
    experiment: &'a str,
    source_row: usize,
    objective: f64,
    configuration: &'a Configuration,
    hyperparameters: Hyperparameters,
    accuracy: AccuracyEntry,
    partition_sizes: PartitionSizes,
    feature_importances: &'a [RankedFeature],
    n_classes: usize,
    confusion_matrix: &'a [Vec<usize>],
    class_metrics: Vec<ClassMetrics>,
}

#[derive(Serialize)]
struct AccuracyEntry {
    train: f64,
    valid: f64,
    test: f64,
}

#[derive(Serialize)]
struct PartitionSizes {
    train: usize,
    valid: usize,
    test: usize,
}
