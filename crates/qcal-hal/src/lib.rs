//! qcal Hardware Abstraction Layer
//!
//! This crate provides a unified interface to control hardware that runs
//! pulse programs, whether a real controller cluster or the local simulator.
//!
//! # Overview
//!
//! - A common [`Backend`] trait for program submission, live progress and results
//! - [`Capabilities`] describing controllers and limits
//! - [`ExecutionResult`] holding the processed result streams
//! - [`wait_with_progress`] for live polling with a timeout
//!
//! # Example: Running a Program
//!
//! ```ignore
//! use std::time::Duration;
//! use qcal_hal::{Backend, wait_with_progress};
//! use qcal_adapter_sim::SimulatorBackend;
//!
//! let backend = SimulatorBackend::new(vec!["con1".into()]);
//! let job_id = backend.submit(&program, &config).await?;
//! let result = wait_with_progress(&backend, &job_id, Duration::from_secs(100), |p| {
//!     println!("{} / {}", p.n, p.shots);
//! })
//! .await?;
//! let state1 = result.buffer("state1")?;
//! ```

pub mod backend;
pub mod capability;
pub mod error;
pub mod job;
pub mod result;

pub use backend::{
    Availability, Backend, BackendConfig, BackendFactory, POLL_INTERVAL, Validation,
    wait_with_progress,
};
pub use capability::Capabilities;
pub use error::{HalError, HalResult};
pub use job::{Job, JobId, JobProgress, JobStatus};
pub use result::{ExecutionResult, StreamData};
