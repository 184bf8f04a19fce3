//! Ramsey with virtual Z rotations.
//!
//! Two `x90` pulses separated by an idle time; instead of detuning the drive,
//! the frame of the second pulse is rotated by `detuning · t`. The fringe
//! frequency gives the qubit frequency offset and its envelope gives T2*.

pub mod analysis;
pub mod node;
pub mod parameters;
pub mod program;

pub use analysis::{Analysis, QubitFit, RamseyFit, analyze, update_machine};
pub use node::{DataSource, NODE_NAME, RamseyNode, RamseyRun};
pub use parameters::RamseyParameters;
pub use program::{build_program, stream_name};
