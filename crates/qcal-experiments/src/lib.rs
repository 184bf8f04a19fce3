//! qcal Calibration Nodes
//!
//! A node builds a pulse program from the machine state, runs it (or
//! simulates it, or reloads an earlier dataset), fits the result, renders
//! figures, writes the calibrated parameters back and stores the run.
//!
//! # Modules
//!
//! - [`ramsey`]: Ramsey with virtual Z rotations (frequency offset and T2*)
//! - [`dataset`]: labelled `(qubit, time)` data
//! - [`figure`]: SVG rendering
//!
//! # Example
//!
//! ```rust,ignore
//! use qcal_experiments::ramsey::{RamseyNode, RamseyParameters};
//!
//! let mut machine = Machine::load(&state_path).await?;
//! let store = NodeStore::new(&storage_root);
//! let run = RamseyNode::new(&backend, &store)
//!     .run(&mut machine, &RamseyParameters::default(), |_| {})
//!     .await?;
//! for line in run.report_lines() {
//!     println!("{line}");
//! }
//! ```

pub mod dataset;
pub mod error;
pub mod figure;
pub mod ramsey;

pub use dataset::{Dataset, Variable};
pub use error::{ExperimentError, ExperimentResult};
pub use figure::FigureConfig;
