//! The Ramsey-with-virtual-Z pulse program.
//!
//! Per qubit, with `t` swept over the idle times:
//!
//! ```text
//! flux point
//! for n in 0..num_averages:
//!     save(n, "n")
//!     for t in idle_times:
//!         align
//!         x90 ── wait t ── frame_rotation(detuning · 4t ns) ── x90
//!         align
//!         readout → save(previous XOR state)  or  save(I)
//!         reset_frame
//!         resonator depletion
//!         active reset                            // I only
//! ```
//!
//! With state discrimination the qubit is never reset: each shot starts from
//! the previous readout and the saved value is whether the state flipped.
//! Mean I needs every shot to start in ground, hence the active reset.

use qcal_pulse::{
    ControlConfig, Operation, Phase, PulseProgram, QubitBlock, ReadoutMode, Sweep, Ticks,
    ns_to_cycles,
};
use qcal_state::{Machine, flux_element, resonator_element, xy_element};

use crate::error::ExperimentResult;
use crate::ramsey::parameters::RamseyParameters;

/// Program name.
pub const PROGRAM_NAME: &str = "ramsey_virtual_z";

/// Settling time after moving the flux point, in clock cycles (1 µs).
pub const FLUX_SETTLE_CYCLES: u32 = 250;

/// Result stream of qubit `index` (0-based).
pub fn stream_name(index: usize, use_state_discrimination: bool) -> String {
    if use_state_discrimination {
        format!("state{}", index + 1)
    } else {
        format!("I{}", index + 1)
    }
}

/// Build the program for `qubits`, sweeping `idle_cycles`.
pub fn build_program(
    machine: &Machine,
    config: &ControlConfig,
    params: &RamseyParameters,
    qubits: &[String],
    idle_cycles: &[u32],
) -> ExperimentResult<PulseProgram> {
    let mode = if params.use_state_discrimination {
        ReadoutMode::StateFlip
    } else {
        ReadoutMode::IQuadrature
    };
    let detuning_hz = params.detuning_hz();

    let mut builder = PulseProgram::builder(PROGRAM_NAME)
        .shots(params.num_averages)
        .sweep(Sweep::new("t", idle_cycles.to_vec()))
        .multiplexed(params.multiplexed);

    for (i, name) in qubits.iter().enumerate() {
        let qubit = machine.qubit(name)?;
        let xy = xy_element(name);
        let rr = resonator_element(name);

        let mut block = QubitBlock::new(name.clone());
        let offsets = machine.flux_offsets(name, params.flux_point_joint_or_independent)?;
        for (element, offset) in &offsets {
            block.prologue.push(Operation::set_dc_offset(*offset, element.clone()));
        }
        if !offsets.is_empty() {
            let mut settle: Vec<String> = offsets.into_iter().map(|(e, _)| e).collect();
            settle.push(xy.clone());
            block.prologue.push(Operation::align(settle));
            block
                .prologue
                .push(Operation::wait(Ticks::Fixed(FLUX_SETTLE_CYCLES), xy.clone()));
        }

        let mut aligned = vec![xy.clone(), rr.clone()];
        if qubit.z.is_some() {
            aligned.push(flux_element(name));
        }
        block.body = vec![
            Operation::align(aligned.clone()),
            Operation::play("x90", xy.clone()),
            Operation::wait(Ticks::Sweep, xy.clone()),
            Operation::frame_rotation_2pi(Phase::VirtualDetuning { detuning_hz }, xy.clone()),
            Operation::play("x90", xy.clone()),
            Operation::align(aligned),
            Operation::measure("readout", rr.clone(), mode, stream_name(i, params.use_state_discrimination)),
            Operation::reset_frame(xy.clone()),
        ];
        let depletion = ns_to_cycles(qubit.resonator.depletion_time_ns);
        if depletion >= qcal_pulse::MIN_WAIT_CYCLES {
            block.body.push(Operation::wait(Ticks::Fixed(depletion), rr.clone()));
        }
        if mode == ReadoutMode::IQuadrature {
            block.body.push(Operation::active_reset("readout", "x180", xy, rr));
        }

        builder = builder
            .block(block)
            .averaged_stream(stream_name(i, params.use_state_discrimination));
    }

    Ok(builder.build(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcal_pulse::{OperationKind, StreamKind};

    fn build(params: &RamseyParameters, qubits: &[&str]) -> PulseProgram {
        let machine = Machine::example();
        let qubits: Vec<String> = qubits.iter().map(|q| q.to_string()).collect();
        let idle = params.idle_cycles().unwrap();
        build_program(&machine, &machine.generate_config(), params, &qubits, &idle).unwrap()
    }

    #[test]
    fn test_program_layout() {
        let params = RamseyParameters::default();
        let program = build(&params, &["qD1", "qD2"]);

        assert_eq!(program.shots, 1500);
        assert_eq!(program.sweep.len(), 1246);
        assert_eq!(program.num_blocks(), 2);
        assert!(program.multiplexed);

        let names: Vec<&str> = program.streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["n", "state1", "state2"]);
        assert_eq!(
            program.stream("state2").unwrap().kind,
            StreamKind::AveragedBuffer { len: 1246 }
        );
    }

    #[test]
    fn test_body_sequence() {
        let params = RamseyParameters::default();
        let program = build(&params, &["qD1"]);
        let kinds: Vec<&str> = program.blocks[0].body.iter().map(|op| op.kind.name()).collect();
        assert_eq!(
            kinds,
            vec![
                "align",
                "play",
                "wait",
                "frame_rotation_2pi",
                "play",
                "align",
                "measure",
                "reset_frame",
                "wait",
            ]
        );
        assert!(matches!(
            program.blocks[0].body[3].kind,
            OperationKind::FrameRotation2Pi {
                phase: Phase::VirtualDetuning { detuning_hz }
            } if detuning_hz == 5e6
        ));
    }

    #[test]
    fn test_independent_flux_point_parks_others() {
        let params = RamseyParameters {
            flux_point_joint_or_independent: qcal_state::FluxPoint::Independent,
            ..RamseyParameters::default()
        };
        let program = build(&params, &["qD2"]);
        let offsets: Vec<(String, f64)> = program.blocks[0]
            .prologue
            .iter()
            .filter_map(|op| match op.kind {
                OperationKind::SetDcOffset { offset } => Some((op.elements[0].clone(), offset)),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![("qD1.z".into(), -0.25), ("qD2.z".into(), 0.0)]);
    }

    #[test]
    fn test_iq_streams_and_sequential() {
        let params = RamseyParameters {
            use_state_discrimination: false,
            multiplexed: false,
            ..RamseyParameters::default()
        };
        let program = build(&params, &["qD1", "qD2"]);
        assert!(!program.multiplexed);
        assert!(program.stream("I2").is_some());
        assert!(matches!(
            &program.blocks[1].body[6].kind,
            OperationKind::Measure { mode: ReadoutMode::IQuadrature, stream, .. } if stream == "I2"
        ));
        for block in &program.blocks {
            assert!(matches!(
                block.body.last().map(|op| &op.kind),
                Some(OperationKind::ActiveReset { readout, pi_pulse })
                    if readout == "readout" && pi_pulse == "x180"
            ));
        }
    }

    #[test]
    fn test_unknown_qubit() {
        let machine = Machine::example();
        let params = RamseyParameters::default();
        let err = build_program(
            &machine,
            &machine.generate_config(),
            &params,
            &["qZ".to_string()],
            &[4, 5],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExperimentError::State(qcal_state::StateError::UnknownQubit(_))
        ));
    }
}
