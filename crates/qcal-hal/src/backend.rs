//! The [`Backend`] trait and the polling loop built on it.
//!
//! A program goes through the backend in one direction:
//!
//! ```text
//!   validate() ──→ submit() ──→ status() + progress() ... ──→ result()
//!                                   │
//!                                   └──→ cancel() on timeout
//! ```
//!
//! `simulate()` is the side door: it renders the analog outputs of a
//! program without running it, for backends that can.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::debug;

use qcal_pulse::{ControlConfig, PulseProgram, SampledWaveforms};

use crate::capability::Capabilities;
use crate::error::{HalError, HalResult};
use crate::job::{JobId, JobProgress, JobStatus};
use crate::result::ExecutionResult;

/// Interval between status polls in [`wait_with_progress`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A backend name plus backend-specific options, e.g. from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl BackendConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Map::new(),
        }
    }

    /// Set an option.
    pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Typed option `key`, `None` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> HalResult<Option<T>> {
        self.options
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    HalError::Configuration(format!("option '{key}' of '{}': {e}", self.name))
                })
            })
            .transpose()
    }
}

/// Trait for control backends.
///
/// `submit()` returns a job in `Queued` state; `result()` is only valid once
/// `status()` reports `Completed`. `progress()` may be called at any time
/// while the job runs.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Controllers and limits, fixed at construction.
    fn capabilities(&self) -> &Capabilities;

    async fn availability(&self) -> HalResult<Availability>;

    /// Check a program against the config and the backend limits.
    async fn validate(&self, program: &PulseProgram, config: &ControlConfig) -> HalResult<Validation> {
        let mut reasons = vec![];
        if let Err(e) = program.validate(config) {
            reasons.push(e.to_string());
        }
        let caps = self.capabilities();
        if program.shots > caps.max_shots {
            reasons.push(format!(
                "{} shots exceed the maximum of {}",
                program.shots, caps.max_shots
            ));
        }
        if let Some(max) = caps.max_iterations {
            if program.total_iterations() > max {
                reasons.push(format!(
                    "{} iterations exceed the maximum of {max}",
                    program.total_iterations()
                ));
            }
        }
        for con in config.controllers() {
            if !caps.controllers.iter().any(|c| c == con) {
                reasons.push(format!("controller '{con}' is not attached"));
            }
        }

        Ok(if reasons.is_empty() {
            Validation::Accepted
        } else {
            Validation::Rejected(reasons)
        })
    }

    /// Queue a program; the job starts out `Queued`.
    async fn submit(&self, program: &PulseProgram, config: &ControlConfig) -> HalResult<JobId>;

    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus>;

    /// Live value of the job's `n` counter.
    async fn progress(&self, job_id: &JobId) -> HalResult<JobProgress>;

    /// Result streams of a `Completed` job. A backend may forget the job once
    /// its result has been handed out.
    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult>;

    async fn cancel(&self, job_id: &JobId) -> HalResult<()>;

    /// Simulate the analog outputs of a program over `duration_ns`.
    async fn simulate(
        &self,
        _program: &PulseProgram,
        _config: &ControlConfig,
        _duration_ns: u64,
    ) -> HalResult<SampledWaveforms> {
        Err(HalError::Unsupported(format!(
            "backend '{}' cannot simulate programs",
            self.name()
        )))
    }

    /// [`wait_with_progress`] without a progress callback.
    async fn wait(&self, job_id: &JobId, timeout: Duration) -> HalResult<ExecutionResult> {
        wait_with_progress(self, job_id, timeout, |_| {}).await
    }
}

/// Poll a job until it finishes, reporting progress after every poll.
///
/// Cancels the job and returns [`HalError::Timeout`] if it is still pending
/// after `timeout`.
pub async fn wait_with_progress<B, F>(
    backend: &B,
    job_id: &JobId,
    timeout: Duration,
    mut on_progress: F,
) -> HalResult<ExecutionResult>
where
    B: Backend + ?Sized,
    F: FnMut(&JobProgress) + Send,
{
    let start = Instant::now();

    loop {
        let status = backend.status(job_id).await?;
        if status.is_pending() {
            let progress = backend.progress(job_id).await?;
            on_progress(&progress);
        }

        match &status {
            JobStatus::Completed => {
                if let Ok(progress) = backend.progress(job_id).await {
                    on_progress(&progress);
                }
                return backend.result(job_id).await;
            }
            JobStatus::Failed(msg) => return Err(HalError::JobFailed(msg.clone())),
            JobStatus::Cancelled => return Err(HalError::JobCancelled),
            JobStatus::Queued | JobStatus::Running => {
                if start.elapsed() >= timeout {
                    debug!("job {job_id} still {status} after {timeout:?}, cancelling");
                    backend.cancel(job_id).await?;
                    return Err(HalError::Timeout(job_id.0.clone()));
                }
                sleep(POLL_INTERVAL).await;
            }
        }
    }
}

/// Whether a backend takes jobs right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub accepting: bool,
    /// Jobs queued or running.
    pub pending_jobs: usize,
    pub message: Option<String>,
}

impl Availability {
    pub fn accepting(pending_jobs: usize) -> Self {
        Self {
            accepting: true,
            pending_jobs,
            message: None,
        }
    }

    pub fn offline(reason: impl Into<String>) -> Self {
        Self {
            accepting: false,
            pending_jobs: 0,
            message: Some(reason.into()),
        }
    }
}

/// Verdict of [`Backend::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    /// Every reason the program cannot run.
    Rejected(Vec<String>),
}

impl Validation {
    /// `Err(SubmissionFailed)` listing the reasons of a rejection.
    pub fn into_result(self) -> HalResult<()> {
        match self {
            Validation::Accepted => Ok(()),
            Validation::Rejected(reasons) => Err(HalError::SubmissionFailed(reasons.join("; "))),
        }
    }
}

/// Backends that can be built from a [`BackendConfig`].
pub trait BackendFactory: Backend + Sized {
    fn from_config(config: BackendConfig) -> HalResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn empty_program() -> PulseProgram {
        PulseProgram {
            name: "empty".into(),
            shots: 1,
            sweep: qcal_pulse::Sweep::new("t", vec![4]),
            blocks: vec![],
            multiplexed: true,
            streams: vec![],
        }
    }

    /// Backend whose jobs never leave `Running`.
    struct StalledBackend {
        caps: Capabilities,
        cancelled: Mutex<bool>,
    }

    #[async_trait]
    impl Backend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }
        fn capabilities(&self) -> &Capabilities {
            &self.caps
        }
        async fn availability(&self) -> HalResult<Availability> {
            Ok(Availability::offline("stuck"))
        }
        async fn submit(&self, _: &PulseProgram, _: &ControlConfig) -> HalResult<JobId> {
            Ok(JobId::new("stalled-1"))
        }
        async fn status(&self, _: &JobId) -> HalResult<JobStatus> {
            Ok(JobStatus::Running)
        }
        async fn progress(&self, _: &JobId) -> HalResult<JobProgress> {
            Ok(JobProgress {
                n: 3,
                shots: 10,
                blocks_done: 0,
                blocks: 1,
            })
        }
        async fn result(&self, id: &JobId) -> HalResult<ExecutionResult> {
            Err(HalError::NotCompleted(id.0.clone()))
        }
        async fn cancel(&self, _: &JobId) -> HalResult<()> {
            *self.cancelled.lock().unwrap() = true;
            Ok(())
        }
    }

    #[test]
    fn test_config_options() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"name": "opx", "seed": 3, "controllers": ["con1"]}"#).unwrap();
        assert_eq!(config.name, "opx");
        assert_eq!(config.get::<u64>("seed").unwrap(), Some(3));
        assert_eq!(config.get::<Vec<String>>("controllers").unwrap().unwrap(), ["con1"]);
        assert_eq!(config.get::<u64>("missing").unwrap(), None);

        let bad = BackendConfig::named("opx").option("seed", serde_json::json!("three"));
        assert!(matches!(bad.get::<u64>("seed"), Err(HalError::Configuration(_))));
    }

    #[test]
    fn test_validation_into_result() {
        assert!(Validation::Accepted.into_result().is_ok());
        let err = Validation::Rejected(vec!["a".into(), "b".into()])
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "Job submission failed: a; b");
    }

    #[tokio::test]
    async fn test_validate_reports_every_limit() {
        let backend = StalledBackend {
            caps: Capabilities {
                max_shots: 10,
                ..Capabilities::simulator(vec!["con2".into()])
            },
            cancelled: Mutex::new(false),
        };
        let mut program = empty_program();
        program.shots = 11;
        let config = ControlConfig::new().with_element(
            "q1.xy",
            qcal_pulse::Element {
                kind: qcal_pulse::ElementKind::Drive,
                controller: "con1".into(),
                port: 1,
                intermediate_frequency: 0.0,
                operations: Default::default(),
            },
        );
        let Validation::Rejected(reasons) = backend.validate(&program, &config).await.unwrap()
        else {
            panic!("expected a rejection");
        };
        assert!(reasons.iter().any(|r| r.contains("11 shots")));
        assert!(reasons.iter().any(|r| r.contains("con1")));
        assert!(!backend.availability().await.unwrap().accepting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_cancels() {
        let backend = StalledBackend {
            caps: Capabilities::simulator(vec![]),
            cancelled: Mutex::new(false),
        };
        let mut polls = 0;
        let err = wait_with_progress(&backend, &JobId::new("stalled-1"), Duration::from_secs(2), |p| {
            polls += 1;
            assert_eq!(p.n, 3);
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HalError::Timeout(_)));
        assert!(*backend.cancelled.lock().unwrap());
        assert!(polls >= 1);
    }

    #[tokio::test]
    async fn test_simulate_unsupported_by_default() {
        let backend = StalledBackend {
            caps: Capabilities::simulator(vec![]),
            cancelled: Mutex::new(false),
        };
        let err = backend
            .simulate(&empty_program(), &ControlConfig::new(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, HalError::Unsupported(_)));
    }
}
