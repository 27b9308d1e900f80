use std::path::PathBuf;

use thiserror::Error;

/// Every fatal condition `shac` can raise. Recoverable conditions (a
/// misconfigured budget, a classifier that can't be trained this epoch) are
/// logged and folded into [`crate::engine::FitOutcome`] instead of being
/// returned here — see the error table in SPEC_FULL.md §7.
#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate parameter name {name:?} in parameter space")]
    DuplicateParameterName { name: String },

    #[error("restored dataset row does not match parameter space schema: {reason}")]
    SchemaMismatch { reason: String },

    #[error("generator exhausted: {attempts} attempts made, cap is {cap}")]
    GeneratorExhausted { attempts: usize, cap: usize },

    #[error("evaluation failed for sample {slot_index}: {reason}")]
    EvaluationFailed { slot_index: usize, reason: String },

    #[error("evaluation of sample {slot_index} timed out after {elapsed_ms}ms")]
    EvaluationTimeout { slot_index: usize, elapsed_ms: u128 },

    #[error("fit cancelled at epoch {epoch}")]
    Cancelled { epoch: usize },

    #[error("failed to persist checkpoint to {path}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {what} at {path}: {source}")]
    Serialization {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("checkpoint at {dir} is missing referenced file {path}")]
    MissingCheckpointFile { dir: PathBuf, path: PathBuf },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
