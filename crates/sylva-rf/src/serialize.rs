//! Model persistence via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::RfError;
use crate::forest::RandomForest;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Header fields are written before the forest so a version mismatch is
/// reported even when the forest layout itself changed.
#[derive(serde::Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    n_trees: usize,
    n_classes: usize,
    forest: &'a RandomForest,
}

/// Leading field of any envelope; bincode decodes it from the prefix alone.
#[derive(serde::Deserialize)]
struct EnvelopeHeader {
    format_version: u32,
}

#[derive(serde::Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    format_version: u32,
    n_trees: usize,
    n_classes: usize,
    forest: RandomForest,
}

impl RandomForest {
    /// Save the fitted forest to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::SerializeModel`] | bincode encoding failed |
    /// | [`RfError::WriteModel`] | file write failed |
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RfError> {
        let path = path.as_ref();

        let envelope = EnvelopeRef {
            format_version: FORMAT_VERSION,
            n_trees: self.trees.len(),
            n_classes: self.n_classes,
            forest: self,
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|source| RfError::SerializeModel { source })?;

        std::fs::write(path, &bytes).map_err(|source| RfError::WriteModel {
            path: path.to_path_buf(),
            source,
        })?;

        info!(size_bytes = bytes.len(), n_trees = self.trees.len(), "model saved");
        Ok(())
    }

    /// Load a forest previously written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::ReadModel`] | file read failed |
    /// | [`RfError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`RfError::DeserializeModel`] | bincode decoding failed |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|source| RfError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;

        let header: EnvelopeHeader =
            bincode::deserialize(&bytes).map_err(|source| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;
        if header.format_version != FORMAT_VERSION {
            return Err(RfError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: header.format_version,
                path: path.to_path_buf(),
            });
        }

        let envelope: Envelope =
            bincode::deserialize(&bytes).map_err(|source| RfError::DeserializeModel {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            n_trees = envelope.n_trees,
            n_classes = envelope.n_classes,
            "model loaded"
        );
        Ok(envelope.forest)
    }
}
