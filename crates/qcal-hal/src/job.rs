//! Jobs: identifiers, status, live progress and the bookkeeping record.
//!
//! ```text
//!   Queued ─→ Running ─→ Completed
//!     │          ├─────→ Failed(reason)
//!     └──────────┴─────→ Cancelled
//! ```
//!
//! A status only moves right; see [`Job::advance`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-assigned job handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    /// Completed, failed or cancelled: the status will not change again.
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        *self == JobStatus::Completed
    }

    fn stage(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Cancelled => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Running => f.write_str("running"),
            JobStatus::Completed => f.write_str("completed"),
            JobStatus::Failed(reason) => write!(f, "failed ({reason})"),
            JobStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Live progress of a running program, read from its counter stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Latest value saved to the `n` stream (shots completed in the current block).
    pub n: u64,
    /// Averaging count per block.
    pub shots: u64,
    /// Blocks (qubits) fully completed.
    pub blocks_done: u64,
    /// Total blocks.
    pub blocks: u64,
}

impl JobProgress {
    /// Fraction of all iterations done, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.shots * self.blocks;
        if total == 0 {
            return 0.0;
        }
        let done = self.blocks_done * self.shots + self.n.min(self.shots);
        (done as f64 / total as f64).min(1.0)
    }
}

/// Bookkeeping a backend keeps per submitted program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Name of the submitted program.
    pub program: String,
    /// Backend that runs it.
    pub backend: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A freshly queued job.
    pub fn queued(
        id: impl Into<JobId>,
        program: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            program: program.into(),
            backend: backend.into(),
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `status` if it lies ahead of the current one, stamping the
    /// start and finish times. Returns whether anything changed.
    pub fn advance(&mut self, status: JobStatus) -> bool {
        if self.status.is_terminal() || status.stage() <= self.status.stage() {
            return false;
        }
        let now = Utc::now();
        if status == JobStatus::Running {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = status;
        true
    }
}
