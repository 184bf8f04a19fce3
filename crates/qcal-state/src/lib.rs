//! qcal State
//!
//! Persistent state shared by calibration nodes:
//!
//! - [`Machine`]: calibrated parameters of every qubit, stored as JSON, and
//!   the control config generated from them
//! - [`NodeStore`]: one folder per node run with its record and artifacts
//! - [`paths`]: default file locations, overridable through the environment

pub mod error;
pub mod machine;
pub mod node;
pub mod paths;

pub use error::{StateError, StateResult};
pub use machine::{
    DriveLine, FluxLine, FluxPoint, GridLocation, Machine, Qubit, ReadoutLine, flux_element,
    resonator_element, xy_element,
};
pub use node::{Artifact, NODE_FILE, NodeRecord, NodeStore, Outcome};
pub use paths::{default_state_path, default_storage_root};
