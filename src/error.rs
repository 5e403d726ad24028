use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the network engine and the training/quantization loops.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Two operands (or a tensor and its declared shape) disagree.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An operation was called while the model was in the wrong state
    /// (e.g. `backward` in eval mode).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A loop needed an optional component (loader, optimizer, criterion)
    /// that was not supplied.
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    /// Malformed or inconsistent dataset.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Checkpoint (safetensors) encoding/decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn shape(expected: &[usize], actual: &[usize]) -> Error {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
