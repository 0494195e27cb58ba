//! File I/O for sylva: labeled datasets, search results and evaluation
//! artifacts.

mod dataset;
mod domain;
mod error;
mod results;
mod table;
mod writer;

pub use dataset::DatasetReader;
pub use domain::{ExperimentName, LabeledDataset};
pub use error::IoError;
pub use results::{BestConfiguration, Configuration, ResultsReader, ResultsTable};
pub use writer::ResultWriter;
