//! Shared test fixtures.

use std::collections::BTreeMap;

use qcal_pulse::{
    ControlConfig, Element, ElementKind, Operation, Phase, PulseDef, PulseProgram, QubitBlock,
    ReadoutMode, Sweep, Ticks, Waveform,
};

/// `q1` with drive, readout and flux elements on `con1`.
pub(crate) fn config() -> ControlConfig {
    let mut xy = Element {
        kind: ElementKind::Drive,
        controller: "con1".into(),
        port: 1,
        intermediate_frequency: 50e6,
        operations: BTreeMap::new(),
    };
    xy.operations.insert(
        "x90".into(),
        PulseDef {
            length_ns: 40,
            waveform: Waveform::Drag {
                amplitude: 0.1,
                sigma_ns: 8.0,
                alpha: 0.0,
            },
        },
    );
    xy.operations.insert(
        "x180".into(),
        PulseDef {
            length_ns: 40,
            waveform: Waveform::Drag {
                amplitude: 0.2,
                sigma_ns: 8.0,
                alpha: 0.0,
            },
        },
    );
    let mut rr = Element {
        kind: ElementKind::Readout,
        controller: "con1".into(),
        port: 3,
        intermediate_frequency: 100e6,
        operations: BTreeMap::new(),
    };
    rr.operations.insert(
        "readout".into(),
        PulseDef {
            length_ns: 400,
            waveform: Waveform::Constant { amplitude: 0.02 },
        },
    );
    let z = Element {
        kind: ElementKind::Flux,
        controller: "con1".into(),
        port: 5,
        intermediate_frequency: 0.0,
        operations: BTreeMap::new(),
    };
    ControlConfig::new()
        .with_element("q1.xy", xy)
        .with_element("q1.resonator", rr)
        .with_element("q1.z", z)
}

/// Ramsey with a virtual detuning on `q1`, 25 idle times from 16 to 976 ns.
/// IQ readout is followed by an active reset.
pub(crate) fn ramsey(mode: ReadoutMode, detuning_hz: f64, shots: u32) -> PulseProgram {
    let mut block = QubitBlock::new("q1");
    block.prologue = vec![Operation::set_dc_offset(0.0, "q1.z")];
    block.body = vec![
        Operation::reset_frame("q1.xy"),
        Operation::play("x90", "q1.xy"),
        Operation::wait(Ticks::Sweep, "q1.xy"),
        Operation::frame_rotation_2pi(Phase::VirtualDetuning { detuning_hz }, "q1.xy"),
        Operation::play("x90", "q1.xy"),
        Operation::align(["q1.xy", "q1.resonator"]),
        Operation::measure("readout", "q1.resonator", mode, "state1"),
    ];
    if mode == ReadoutMode::IQuadrature {
        block
            .body
            .push(Operation::active_reset("readout", "x180", "q1.xy", "q1.resonator"));
    }
    PulseProgram::builder("ramsey")
        .shots(shots)
        .sweep(Sweep::new("t", (4..254).step_by(10).collect()))
        .block(block)
        .averaged_stream("state1")
        .build(&config())
        .unwrap()
}
