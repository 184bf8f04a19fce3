//! Error types for machine state and node storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or saving state.
#[derive(Debug, Error)]
pub enum StateError {
    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// State file does not exist.
    #[error("State file not found: {}", .0.display())]
    StateNotFound(PathBuf),

    /// Qubit is not part of the machine.
    #[error("Unknown qubit: {0}")]
    UnknownQubit(String),

    /// Flux point name not recognised.
    #[error("Invalid flux point '{0}', expected 'joint' or 'independent'")]
    InvalidFluxPoint(String),

    /// No node with this id in the store.
    #[error("Node #{0} not found")]
    NodeNotFound(u64),

    /// Artifact missing from a stored node.
    #[error("Node #{id} has no artifact '{name}'")]
    ArtifactNotFound {
        /// Node id.
        id: u64,
        /// Artifact file name.
        name: String,
    },

    /// Home directory could not be determined.
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
