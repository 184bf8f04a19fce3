//! qcal Local Device Simulator
//!
//! This crate emulates a control cluster wired to superconducting transmons,
//! for developing and testing calibration nodes without hardware.
//!
//! # Features
//!
//! - **Shot-level emulation**: every shot samples a projective readout, so
//!   averaged streams carry realistic binomial noise
//! - **No active reset**: the qubit starts each shot where the previous readout
//!   left it, and state-flip readout saves `previous XOR current`
//! - **Dephasing**: exponential or Gaussian T2* envelopes per qubit
//! - **Flux**: DC offsets on a qubit's flux line shift its frequency quadratically
//!   away from the sweet spot
//! - **Waveforms**: [`Backend::simulate`](qcal_hal::Backend::simulate) renders the analog
//!   outputs of the first nanoseconds of a program
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use qcal_adapter_sim::{Device, QubitModel, SimulatorBackend};
//! use qcal_hal::Backend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = Device::default().with_qubit(
//!         "qD1",
//!         QubitModel { detuning_hz: 400e3, ..QubitModel::default() },
//!     );
//!     let backend = SimulatorBackend::new(vec!["con1".into()]).with_device(device);
//!
//!     let job_id = backend.submit(&program, &config).await?;
//!     let result = backend.wait(&job_id, Duration::from_secs(100)).await?;
//!     println!("{:?}", result.buffer("state1")?);
//!     Ok(())
//! }
//! ```

mod executor;
mod model;
mod simulator;

#[cfg(test)]
mod fixtures;

pub use model::{Bloch, Dephasing, Device, QubitModel};
pub use simulator::SimulatorBackend;
