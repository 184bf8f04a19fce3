//! Pulse-level operations and their operands.

use serde::{Deserialize, Serialize};

/// Duration operand of a wait, in clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ticks {
    /// Fixed number of clock cycles.
    Fixed(u32),
    /// Current value of the program's sweep axis.
    Sweep,
}

impl Ticks {
    /// Resolve against the current sweep value.
    pub fn resolve(self, sweep: u32) -> u32 {
        match self {
            Ticks::Fixed(c) => c,
            Ticks::Sweep => sweep,
        }
    }
}

/// Phase operand of a frame rotation, in turns (units of 2π).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    /// Fixed phase.
    Turns(f64),
    /// Phase accumulated at `detuning_hz` over the current sweep value
    /// (interpreted as an idle time in clock cycles).
    VirtualDetuning {
        /// Emulated detuning in Hz.
        detuning_hz: f64,
    },
}

impl Phase {
    /// Resolve against the current sweep value.
    pub fn resolve(self, sweep: u32) -> f64 {
        match self {
            Phase::Turns(t) => t,
            Phase::VirtualDetuning { detuning_hz } => {
                crate::units::virtual_z_turns(detuning_hz, sweep)
            }
        }
    }
}

/// What a readout saves to its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadoutMode {
    /// Discriminate the state and save `previous XOR current`, then keep the
    /// current state as the new reference. Works without active reset.
    StateFlip,
    /// Save the demodulated I quadrature in volts.
    IQuadrature,
}

/// The kind of a pulse-level operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationKind {
    /// Play a named pulse on the element.
    Play {
        /// Operation name in the element's pulse table.
        pulse: String,
    },
    /// Idle the element.
    Wait {
        /// Idle duration.
        duration: Ticks,
    },
    /// Rotate the element's oscillator frame (virtual Z).
    FrameRotation2Pi {
        /// Rotation angle.
        phase: Phase,
    },
    /// Reset the element's frame to zero phase.
    ResetFrame,
    /// Bring all listed elements to the same point in time.
    Align,
    /// Play the readout pulse and acquire.
    Measure {
        /// Readout pulse name.
        pulse: String,
        /// Value written to the stream.
        mode: ReadoutMode,
        /// Target stream.
        stream: String,
    },
    /// Measure, then play `pi_pulse` on the drive if the qubit reads
    /// excited. Addresses `[drive, readout]`.
    ActiveReset {
        /// Readout pulse on the resonator.
        readout: String,
        /// Conditional pi pulse on the drive.
        pi_pulse: String,
    },
    /// Set a DC offset on a flux element.
    SetDcOffset {
        /// Offset in volts.
        offset: f64,
    },
}

impl OperationKind {
    /// Short name, for logs and validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Play { .. } => "play",
            OperationKind::Wait { .. } => "wait",
            OperationKind::FrameRotation2Pi { .. } => "frame_rotation_2pi",
            OperationKind::ResetFrame => "reset_frame",
            OperationKind::Align => "align",
            OperationKind::Measure { .. } => "measure",
            OperationKind::ActiveReset { .. } => "active_reset",
            OperationKind::SetDcOffset { .. } => "set_dc_offset",
        }
    }
}

/// An operation together with the elements it acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The kind of operation.
    pub kind: OperationKind,
    /// Elements the operation addresses.
    pub elements: Vec<String>,
}

impl Operation {
    /// Play a pulse on one element.
    pub fn play(pulse: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Play {
                pulse: pulse.into(),
            },
            elements: vec![element.into()],
        }
    }

    /// Wait on one element.
    pub fn wait(duration: Ticks, element: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Wait { duration },
            elements: vec![element.into()],
        }
    }

    /// Rotate an element's frame.
    pub fn frame_rotation_2pi(phase: Phase, element: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::FrameRotation2Pi { phase },
            elements: vec![element.into()],
        }
    }

    /// Reset an element's frame.
    pub fn reset_frame(element: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::ResetFrame,
            elements: vec![element.into()],
        }
    }

    /// Align a set of elements.
    pub fn align(elements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: OperationKind::Align,
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Measure on a readout element.
    pub fn measure(
        pulse: impl Into<String>,
        element: impl Into<String>,
        mode: ReadoutMode,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::Measure {
                pulse: pulse.into(),
                mode,
                stream: stream.into(),
            },
            elements: vec![element.into()],
        }
    }

    /// Return a qubit to ground by measuring it and flipping it back if
    /// it reads excited.
    pub fn active_reset(
        readout: impl Into<String>,
        pi_pulse: impl Into<String>,
        drive: impl Into<String>,
        resonator: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::ActiveReset {
                readout: readout.into(),
                pi_pulse: pi_pulse.into(),
            },
            elements: vec![drive.into(), resonator.into()],
        }
    }

    /// Set a flux offset.
    pub fn set_dc_offset(offset: f64, element: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::SetDcOffset { offset },
            elements: vec![element.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_operands() {
        assert_eq!(Ticks::Fixed(7).resolve(100), 7);
        assert_eq!(Ticks::Sweep.resolve(100), 100);
        assert_eq!(Phase::Turns(0.25).resolve(3), 0.25);
    }

    #[test]
    fn test_operation_serde_tags() {
        let op = Operation::wait(Ticks::Sweep, "q1.xy");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"]["op"], "wait");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
