//! qcal Pulse Program Intermediate Representation
//!
//! This crate describes what the control hardware plays: elements (drive,
//! readout and flux lines), the pulses they know, and programs built from
//! pulse-level operations inside an averaging loop and a single sweep axis.
//!
//! # Core Components
//!
//! - **Units**: [`idle_times`], [`CLOCK_CYCLE_NS`] and the virtual-Z phase helper
//! - **Config**: [`ControlConfig`] with [`Element`]s and [`PulseDef`]s
//! - **Operations**: [`Operation`] / [`OperationKind`] (`play`, `wait`,
//!   `frame_rotation_2pi`, `reset_frame`, `align`, `measure`, `set_dc_offset`)
//! - **Programs**: [`PulseProgram`] and its builder
//! - **Timing**: [`Timeline`] lowering and [`SampledWaveforms`] rendering
//!
//! # Example: A Ramsey Body
//!
//! ```rust,ignore
//! use qcal_pulse::{Operation, Phase, PulseProgram, QubitBlock, ReadoutMode, Sweep, Ticks};
//!
//! let mut block = QubitBlock::new("q1");
//! block.body = vec![
//!     Operation::play("x90", "q1.xy"),
//!     Operation::wait(Ticks::Sweep, "q1.xy"),
//!     Operation::frame_rotation_2pi(Phase::VirtualDetuning { detuning_hz: 5e6 }, "q1.xy"),
//!     Operation::play("x90", "q1.xy"),
//!     Operation::align(["q1.xy", "q1.resonator"]),
//!     Operation::measure("readout", "q1.resonator", ReadoutMode::StateFlip, "state1"),
//!     Operation::reset_frame("q1.xy"),
//! ];
//!
//! let program = PulseProgram::builder("ramsey")
//!     .shots(1000)
//!     .sweep(Sweep::new("idle_time", qcal_pulse::idle_times(16, 2000)?))
//!     .block(block)
//!     .averaged_stream("state1")
//!     .build(&config)?;
//! ```

pub mod config;
pub mod error;
pub mod instruction;
pub mod program;
pub mod schedule;
pub mod units;

#[cfg(test)]
mod fixtures;

pub use config::{ControlConfig, Element, ElementKind, PulseDef, Waveform};
pub use error::{PulseError, PulseResult};
pub use instruction::{Operation, OperationKind, Phase, ReadoutMode, Ticks};
pub use program::{
    PROGRESS_STREAM, PulseProgram, PulseProgramBuilder, QubitBlock, StreamKind, StreamSpec, Sweep,
};
pub use schedule::{SampledWaveforms, ScheduledOp, TimedKind, Timeline};
pub use units::{
    CLOCK_CYCLE_NS, MAX_SIMULATION_NS, MIN_WAIT_CYCLES, cycles_to_ns, idle_times, ns_to_cycles,
};
