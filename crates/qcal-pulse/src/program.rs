//! Pulse programs: an averaging loop around a single swept body.
//!
//! Execution order of a [`PulseProgram`]:
//!
//! ```text
//! for block in blocks:                  // one block per qubit
//!     block.prologue                    // e.g. flux point
//!     for n in 0..shots:
//!         save(n, "n")
//!         for t in sweep.values:
//!             block.body(t)
//!     if !multiplexed: align(all)
//! ```
//!
//! Stream processing averages every `AveragedBuffer` stream over `shots`,
//! giving one value per sweep point.

use serde::{Deserialize, Serialize};

use crate::config::{ControlConfig, ElementKind};
use crate::error::{PulseError, PulseResult};
use crate::instruction::{Operation, OperationKind, Ticks};
use crate::units::MIN_WAIT_CYCLES;

/// Name of the progress counter stream.
pub const PROGRESS_STREAM: &str = "n";

/// The swept axis of a program (clock cycles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    /// Axis name.
    pub name: String,
    /// Values, in clock cycles.
    pub values: Vec<u32>,
}

impl Sweep {
    /// Create a sweep axis.
    pub fn new(name: impl Into<String>, values: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Number of sweep points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the axis is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Operations addressed to one qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QubitBlock {
    /// Qubit name.
    pub qubit: String,
    /// Run once before the averaging loop.
    pub prologue: Vec<Operation>,
    /// Run for every shot and sweep value.
    pub body: Vec<Operation>,
}

impl QubitBlock {
    /// Create an empty block.
    pub fn new(qubit: impl Into<String>) -> Self {
        Self {
            qubit: qubit.into(),
            prologue: vec![],
            body: vec![],
        }
    }

    /// Every element this block touches, in first-use order.
    pub fn elements(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = vec![];
        for op in self.prologue.iter().chain(&self.body) {
            for e in &op.elements {
                if !seen.contains(&e.as_str()) {
                    seen.push(e);
                }
            }
        }
        seen
    }

    /// Streams written by measurements in the body.
    pub fn measured_streams(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|op| match &op.kind {
            OperationKind::Measure { stream, .. } => Some(stream.as_str()),
            _ => None,
        })
    }
}

/// Result stream layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Latest value of the averaging counter.
    Counter,
    /// Per-sweep-point average over all shots.
    AveragedBuffer {
        /// Buffer length (the sweep length).
        len: usize,
    },
}

/// A declared result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream name.
    pub name: String,
    /// Layout.
    pub kind: StreamKind,
}

/// A complete, validated pulse program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseProgram {
    /// Program name.
    pub name: String,
    /// Averaging count.
    pub shots: u32,
    /// Swept axis.
    pub sweep: Sweep,
    /// Per-qubit operations.
    pub blocks: Vec<QubitBlock>,
    /// Run blocks in parallel (true) or one after another (false).
    pub multiplexed: bool,
    /// Declared result streams.
    pub streams: Vec<StreamSpec>,
}

impl PulseProgram {
    /// Start building a program.
    pub fn builder(name: impl Into<String>) -> PulseProgramBuilder {
        PulseProgramBuilder::new(name)
    }

    /// Number of qubit blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total body executions across all blocks.
    pub fn total_iterations(&self) -> u64 {
        self.blocks.len() as u64 * u64::from(self.shots) * self.sweep.len() as u64
    }

    /// Look up a declared stream.
    pub fn stream(&self, name: &str) -> Option<&StreamSpec> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Check the program against a control config.
    pub fn validate(&self, config: &ControlConfig) -> PulseResult<()> {
        if self.blocks.is_empty() {
            return Err(PulseError::EmptyProgram(self.name.clone()));
        }
        if self.sweep.is_empty() {
            return Err(PulseError::InvalidSweep(format!(
                "sweep '{}' has no points",
                self.sweep.name
            )));
        }
        if self.shots == 0 {
            return Err(PulseError::InvalidSweep("shots must be positive".into()));
        }

        for block in &self.blocks {
            for op in block.prologue.iter().chain(&block.body) {
                validate_operation(op, config, &self.sweep)?;
            }
            for stream in block.measured_streams() {
                match self.stream(stream) {
                    Some(StreamSpec {
                        kind: StreamKind::AveragedBuffer { len },
                        ..
                    }) if *len == self.sweep.len() => {}
                    Some(_) => {
                        return Err(PulseError::InvalidStream {
                            name: stream.to_string(),
                            reason: format!(
                                "must be an averaged buffer of length {}",
                                self.sweep.len()
                            ),
                        });
                    }
                    None => {
                        return Err(PulseError::InvalidStream {
                            name: stream.to_string(),
                            reason: "measured but not declared".into(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn validate_operation(op: &Operation, config: &ControlConfig, sweep: &Sweep) -> PulseResult<()> {
    for element in &op.elements {
        if !config.elements.contains_key(element) {
            return Err(PulseError::UnknownElement {
                element: element.clone(),
                context: Some(op.kind.name().to_string()),
            });
        }
    }

    match &op.kind {
        OperationKind::Play { pulse } | OperationKind::Measure { pulse, .. } => {
            for element in &op.elements {
                config.pulse(element, pulse)?;
            }
        }
        OperationKind::ActiveReset { readout, pi_pulse } => {
            let [drive, resonator] = op.elements.as_slice() else {
                return Err(PulseError::InvalidTargets {
                    op: op.kind.name(),
                    reason: format!("needs [drive, readout], got {} element(s)", op.elements.len()),
                });
            };
            if config.element(drive)?.kind != ElementKind::Drive
                || config.element(resonator)?.kind != ElementKind::Readout
            {
                return Err(PulseError::InvalidTargets {
                    op: op.kind.name(),
                    reason: format!("needs [drive, readout], got ['{drive}', '{resonator}']"),
                });
            }
            config.pulse(resonator, readout)?;
            config.pulse(drive, pi_pulse)?;
        }
        OperationKind::Wait { duration } => {
            let shortest = match duration {
                Ticks::Fixed(c) => *c,
                Ticks::Sweep => sweep.values.iter().copied().min().unwrap_or(0),
            };
            if shortest < MIN_WAIT_CYCLES {
                return Err(PulseError::WaitTooShort {
                    cycles: shortest,
                    min: MIN_WAIT_CYCLES,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Builder for [`PulseProgram`].
#[derive(Debug, Clone)]
pub struct PulseProgramBuilder {
    program: PulseProgram,
}

impl PulseProgramBuilder {
    /// Create a builder with one shot, no sweep and multiplexed blocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            program: PulseProgram {
                name: name.into(),
                shots: 1,
                sweep: Sweep::new("sweep", vec![]),
                blocks: vec![],
                multiplexed: true,
                streams: vec![StreamSpec {
                    name: PROGRESS_STREAM.into(),
                    kind: StreamKind::Counter,
                }],
            },
        }
    }

    /// Set the averaging count.
    pub fn shots(mut self, shots: u32) -> Self {
        self.program.shots = shots;
        self
    }

    /// Set the sweep axis.
    pub fn sweep(mut self, sweep: Sweep) -> Self {
        self.program.sweep = sweep;
        self
    }

    /// Choose parallel or sequential qubit blocks.
    pub fn multiplexed(mut self, multiplexed: bool) -> Self {
        self.program.multiplexed = multiplexed;
        self
    }

    /// Append a qubit block.
    pub fn block(mut self, block: QubitBlock) -> Self {
        self.program.blocks.push(block);
        self
    }

    /// Declare an averaged buffer stream sized to the sweep.
    pub fn averaged_stream(mut self, name: impl Into<String>) -> Self {
        let len = self.program.sweep.len();
        self.program.streams.push(StreamSpec {
            name: name.into(),
            kind: StreamKind::AveragedBuffer { len },
        });
        self
    }

    /// Validate against `config` and return the program.
    pub fn build(self, config: &ControlConfig) -> PulseResult<PulseProgram> {
        self.program.validate(config)?;
        tracing::debug!(
            name = %self.program.name,
            blocks = self.program.blocks.len(),
            sweep = self.program.sweep.len(),
            shots = self.program.shots,
            "built pulse program"
        );
        Ok(self.program)
    }
}
