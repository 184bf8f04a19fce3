//! Error types for calibration nodes.

use qcal_hal::HalError;
use qcal_pulse::PulseError;
use qcal_state::StateError;
use thiserror::Error;

/// Errors that can occur while running a node.
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Parameters are inconsistent.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Program construction failed.
    #[error(transparent)]
    Pulse(#[from] PulseError),

    /// Backend failure, including timeouts.
    #[error(transparent)]
    Hal(#[from] HalError),

    /// Machine state or node store failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// Result streams do not match the expected dataset.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Parameter file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for node operations.
pub type ExperimentResult<T> = Result<T, ExperimentError>;
