use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use sylva_io::{
    BestConfiguration, DatasetReader, ExperimentName, LabeledDataset, ResultWriter, ResultsReader,
};
use sylva_rf::{HoldoutResult, HoldoutSplit, Hyperparameters};

#[derive(Parser)]
#[command(name = "sylva")]
#[command(about = "Re-evaluate the best random forest configuration from a hyperparameter search")]
#[command(version)]
struct Cli {
    /// Search results CSV; columns before the objective are hyperparameters
    #[arg(long, default_value = "results.csv")]
    results: PathBuf,

    /// Column used to rank configurations (highest wins)
    #[arg(long, default_value = "objective")]
    objective: String,

    /// Labeled dataset CSV
    #[arg(long, default_value = "airlines.csv")]
    data: PathBuf,

    /// Label column (defaults to the last column)
    #[arg(long)]
    target: Option<String>,

    /// Fraction of all samples held out for testing
    #[arg(long, default_value_t = 0.33)]
    test_ratio: f64,

    /// Fraction of the non-test samples held out for validation
    #[arg(long, default_value_t = 0.33)]
    valid_ratio: f64,

    /// RNG seed for the train/validation/test split
    #[arg(long, default_value_t = 42)]
    split_seed: u64,

    /// RNG seed for the forest
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Experiment name; writes the evaluation JSON and model (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: Option<String>,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Print a JSON summary instead of the accuracy lines
    #[arg(long)]
    json: bool,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    verbose: bool,

    /// Only log errors
    #[arg(long)]
    quiet: bool,
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    source_row: usize,
    objective: f64,
    hyperparameters: &'a Hyperparameters,
    train_accuracy: f64,
    valid_accuracy: f64,
    test_accuracy: f64,
    n_train: usize,
    n_valid: usize,
    n_test: usize,
}

/// Validate `--experiment` up front so a bad name fails before any fitting.
fn experiment_name(cli: &Cli) -> Result<Option<ExperimentName>> {
    cli.experiment
        .clone()
        .map(ExperimentName::new)
        .transpose()
        .context("invalid --experiment name")
}

/// Pick the best row of the results table and score its configuration on a
/// fresh hold-out split of the dataset.
fn evaluate_configuration(
    cli: &Cli,
) -> Result<(BestConfiguration, Hyperparameters, LabeledDataset, HoldoutResult)> {
    let table = ResultsReader::new(&cli.results)
        .with_objective_column(cli.objective.as_str())
        .read()
        .context("failed to read search results")?;
    let best = table.best().context("failed to select best configuration")?;
    let hyperparameters = best
        .configuration()
        .hyperparameters()
        .with_context(|| format!("row {} is not a random forest configuration", best.row_index()))?;
    info!(
        row = best.row_index(),
        objective = best.objective(),
        n_estimators = hyperparameters.n_estimators,
        criterion = %hyperparameters.criterion,
        max_depth = ?hyperparameters.max_depth,
        min_samples_split = hyperparameters.min_samples_split,
        "best configuration"
    );

    let config = hyperparameters
        .to_config(cli.seed)
        .context("invalid forest configuration")?;

    let mut reader = DatasetReader::new(&cli.data);
    if let Some(target) = &cli.target {
        reader = reader.with_target(target.as_str());
    }
    let dataset = reader.read().context("failed to read dataset CSV")?;

    let split = HoldoutSplit::new(cli.test_ratio, cli.valid_ratio)
        .context("invalid hold-out ratios")?
        .with_seed(cli.split_seed);
    let result = split
        .evaluate(
            &config,
            dataset.features(),
            dataset.labels(),
            dataset.feature_names(),
        )
        .context("hold-out evaluation failed")?;

    Ok((best, hyperparameters, dataset, result))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    let experiment = experiment_name(&cli)?;
    let (best, hyperparameters, dataset, result) = evaluate_configuration(&cli)?;

    if let Some(experiment_name) = experiment {
        let writer = ResultWriter::new(&cli.output_dir, experiment_name)
            .context("failed to prepare output directory")?;
        writer
            .write_evaluation(&best, &result)
            .context("failed to write evaluation JSON")?;
        result
            .forest()
            .save(writer.model_path())
            .context("failed to save model")?;
        info!(
            path = %writer.model_path().display(),
            n_classes = dataset.n_classes(),
            "artifacts written"
        );
    }

    if cli.json {
        let (n_train, n_valid, n_test) = result.partition_sizes();
        let output = EvaluateOutput {
            source_row: best.row_index(),
            objective: best.objective(),
            hyperparameters: &hyperparameters,
            train_accuracy: result.train_accuracy(),
            valid_accuracy: result.valid_accuracy(),
            test_accuracy: result.test_accuracy(),
            n_train,
            n_valid,
            n_test,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Accuracy on Training: {:.3}", result.train_accuracy());
        println!("Accuracy on Validation: {:.3}", result.valid_accuracy());
        println!("Accuracy on Testing: {:.3}", result.test_accuracy());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_run() {
        let cli = Cli::parse_from(["sylva"]);
        assert_eq!(cli.results, PathBuf::from("results.csv"));
        assert_eq!(cli.data, PathBuf::from("airlines.csv"));
        assert!((cli.test_ratio - 0.33).abs() < f64::EPSILON);
        assert_eq!(cli.split_seed, 42);
        assert!(experiment_name(&cli).unwrap().is_none());
    }

    #[test]
    fn bad_experiment_name_fails_before_reading_inputs() {
        // The input paths do not exist; the name check must fail first.
        let cli = Cli::parse_from([
            "sylva",
            "--experiment",
            "bad name!",
            "--results",
            "/nonexistent/results.csv",
        ]);
        let err = experiment_name(&cli).unwrap_err();
        assert!(err.to_string().contains("--experiment"));
        assert!(matches!(
            err.downcast_ref::<sylva_io::IoError>(),
            Some(sylva_io::IoError::InvalidExperimentName { .. })
        ));
    }

    #[test]
    fn quiet_flag_only_affects_logging() {
        use clap::CommandFactory;

        let cmd = Cli::command();
        let quiet = cmd
            .get_arguments()
            .find(|a| a.get_id() == "quiet")
            .unwrap();
        assert_eq!(quiet.get_help().unwrap().to_string(), "Only log errors");
    }

    #[test]
    fn valid_experiment_name_accepted() {
        let cli = Cli::parse_from(["sylva", "--experiment", "airlines_rf"]);
        let name = experiment_name(&cli).unwrap().unwrap();
        assert_eq!(name.as_str(), "airlines_rf");
    }
}
