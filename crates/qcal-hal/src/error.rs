//! HAL errors.

use qcal_pulse::PulseError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// The backend refused the program.
    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    /// The program stopped with an error on the backend.
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job was cancelled")]
    JobCancelled,

    #[error("No job with id {0}")]
    JobNotFound(String),

    /// Result requested before the job completed.
    #[error("Job {0} has not completed")]
    NotCompleted(String),

    #[error("Invalid program: {0}")]
    InvalidProgram(#[from] PulseError),

    /// A stream the caller expected is absent from the result.
    #[error("Result stream '{0}' not found")]
    MissingStream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend configuration: {0}")]
    Configuration(String),

    /// Job still pending when the wait gave up; it has been cancelled.
    #[error("Timed out waiting for job {0}")]
    Timeout(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type HalResult<T> = Result<T, HalError>;
