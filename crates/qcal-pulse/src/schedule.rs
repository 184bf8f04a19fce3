//! Timing: lowering a program to a per-element timeline, and rendering that
//! timeline into sampled analog outputs.
//!
//! Every element keeps its own clock and oscillator frame. `play`, `measure`
//! and `wait` advance the clock; `align` moves all listed elements to the
//! latest of their clocks; frame operations take no time.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ControlConfig, ElementKind, PulseDef};
use crate::error::{PulseError, PulseResult};
use crate::instruction::{Operation, OperationKind};
use crate::program::PulseProgram;
use crate::units::{MAX_SIMULATION_NS, SAMPLES_PER_NS, cycles_to_ns};

/// What happens on an element at a scheduled time.
#[derive(Debug, Clone, PartialEq)]
pub enum TimedKind {
    /// Drive pulse with the frame phase (turns) it was played in.
    Pulse {
        /// Pulse definition.
        pulse: PulseDef,
        /// Frame phase in turns.
        frame: f64,
    },
    /// Readout pulse with acquisition.
    Acquire {
        /// Pulse definition.
        pulse: PulseDef,
        /// Frame phase in turns.
        frame: f64,
    },
    /// Flux DC level change.
    DcOffset {
        /// New level in volts.
        offset: f64,
    },
}

/// One entry of a [`Timeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOp {
    /// Start time in ns from program start.
    pub start_ns: u64,
    /// Duration in ns.
    pub duration_ns: u64,
    /// Element name.
    pub element: String,
    /// What is played.
    pub kind: TimedKind,
}

#[derive(Debug, Clone, Copy, Default)]
struct ElementState {
    time: u64,
    frame: f64,
}

/// A lowered program, truncated to a time window.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    ops: Vec<ScheduledOp>,
    end_ns: u64,
}

impl Timeline {
    /// Lower `program` until each block's clock has passed `window_ns`.
    ///
    /// `window_ns` must lie in `1..=MAX_SIMULATION_NS`.
    pub fn build(
        program: &PulseProgram,
        config: &ControlConfig,
        window_ns: u64,
    ) -> PulseResult<Self> {
        if window_ns == 0 || window_ns > MAX_SIMULATION_NS {
            return Err(PulseError::InvalidWindow {
                window_ns,
                max_ns: MAX_SIMULATION_NS,
            });
        }
        let mut timeline = Timeline::default();
        let mut clocks: BTreeMap<String, ElementState> = BTreeMap::new();
        let mut block_start = 0u64;

        for block in &program.blocks {
            let start = if program.multiplexed { 0 } else { block_start };
            let elements: Vec<String> = block.elements().into_iter().map(String::from).collect();
            for e in &elements {
                let state = clocks.entry(e.clone()).or_default();
                state.time = state.time.max(start);
            }

            for op in &block.prologue {
                timeline.apply(op, 0, config, &mut clocks)?;
            }

            'shots: for _ in 0..program.shots {
                for &t in &program.sweep.values {
                    for op in &block.body {
                        timeline.apply(op, t, config, &mut clocks)?;
                    }
                    let latest = elements
                        .iter()
                        .filter_map(|e| clocks.get(e))
                        .map(|s| s.time)
                        .max()
                        .unwrap_or(0);
                    if latest >= window_ns {
                        break 'shots;
                    }
                }
            }

            block_start = elements
                .iter()
                .filter_map(|e| clocks.get(e))
                .map(|s| s.time)
                .max()
                .unwrap_or(block_start);
        }

        timeline.end_ns = clocks.values().map(|s| s.time).max().unwrap_or(0);
        debug!(
            ops = timeline.ops.len(),
            end_ns = timeline.end_ns,
            window_ns,
            "lowered program to timeline"
        );
        Ok(timeline)
    }

    fn apply(
        &mut self,
        op: &Operation,
        sweep: u32,
        config: &ControlConfig,
        clocks: &mut BTreeMap<String, ElementState>,
    ) -> PulseResult<()> {
        match &op.kind {
            OperationKind::Align => {
                let latest = op
                    .elements
                    .iter()
                    .filter_map(|e| clocks.get(e))
                    .map(|s| s.time)
                    .max()
                    .unwrap_or(0);
                for e in &op.elements {
                    clocks.entry(e.clone()).or_default().time = latest;
                }
            }
            OperationKind::ActiveReset { readout, pi_pulse } => {
                let [drive, resonator] = op.elements.as_slice() else {
                    return Err(PulseError::InvalidTargets {
                        op: op.kind.name(),
                        reason: format!("needs [drive, readout], got {} element(s)", op.elements.len()),
                    });
                };
                let readout = config.pulse(resonator, readout)?.clone();
                let pi = config.pulse(drive, pi_pulse)?.clone();
                let start = [drive, resonator]
                    .into_iter()
                    .filter_map(|e| clocks.get(e))
                    .map(|s| s.time)
                    .max()
                    .unwrap_or(0);
                let pi_start = start + u64::from(readout.length_ns);
                let end = pi_start + u64::from(pi.length_ns);

                // the conditional pi pulse is drawn as if it always plays
                let rr = clocks.entry(resonator.clone()).or_default();
                self.ops.push(ScheduledOp {
                    start_ns: start,
                    duration_ns: u64::from(readout.length_ns),
                    element: resonator.clone(),
                    kind: TimedKind::Acquire {
                        pulse: readout,
                        frame: rr.frame,
                    },
                });
                rr.time = end;
                let xy = clocks.entry(drive.clone()).or_default();
                self.ops.push(ScheduledOp {
                    start_ns: pi_start,
                    duration_ns: u64::from(pi.length_ns),
                    element: drive.clone(),
                    kind: TimedKind::Pulse {
                        pulse: pi,
                        frame: xy.frame,
                    },
                });
                xy.time = end;
            }
            kind => {
                for e in &op.elements {
                    let state = clocks.entry(e.clone()).or_default();
                    match kind {
                        OperationKind::Play { pulse } | OperationKind::Measure { pulse, .. } => {
                            let def = config.pulse(e, pulse)?.clone();
                            let duration_ns = u64::from(def.length_ns);
                            let timed = if matches!(kind, OperationKind::Play { .. }) {
                                TimedKind::Pulse {
                                    pulse: def,
                                    frame: state.frame,
                                }
                            } else {
                                TimedKind::Acquire {
                                    pulse: def,
                                    frame: state.frame,
                                }
                            };
                            self.ops.push(ScheduledOp {
                                start_ns: state.time,
                                duration_ns,
                                element: e.clone(),
                                kind: timed,
                            });
                            state.time += duration_ns;
                        }
                        OperationKind::Wait { duration } => {
                            state.time += cycles_to_ns(duration.resolve(sweep));
                        }
                        OperationKind::FrameRotation2Pi { phase } => {
                            state.frame = (state.frame + phase.resolve(sweep)).rem_euclid(1.0);
                        }
                        OperationKind::ResetFrame => state.frame = 0.0,
                        OperationKind::SetDcOffset { offset } => {
                            self.ops.push(ScheduledOp {
                                start_ns: state.time,
                                duration_ns: 0,
                                element: e.clone(),
                                kind: TimedKind::DcOffset { offset: *offset },
                            });
                        }
                        OperationKind::Align | OperationKind::ActiveReset { .. } => {
                            unreachable!("handled above")
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Scheduled operations in emission order.
    pub fn ops(&self) -> &[ScheduledOp] {
        &self.ops
    }

    /// Latest element clock after lowering.
    pub fn end_ns(&self) -> u64 {
        self.end_ns
    }

    /// Operations scheduled on one element.
    pub fn on_element<'a>(&'a self, element: &'a str) -> impl Iterator<Item = &'a ScheduledOp> {
        self.ops.iter().filter(move |op| op.element == element)
    }
}

/// Analog output traces per controller and port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampledWaveforms {
    /// Rendered window in ns.
    pub window_ns: u64,
    /// `controller -> port -> samples` (volts, one sample per ns).
    pub controllers: BTreeMap<String, BTreeMap<u32, Vec<f64>>>,
}

impl SampledWaveforms {
    /// Render a timeline into analog samples over `[0, window_ns)`.
    pub fn render(timeline: &Timeline, config: &ControlConfig, window_ns: u64) -> Self {
        let len = (window_ns * u64::from(SAMPLES_PER_NS)) as usize;
        let mut controllers: BTreeMap<String, BTreeMap<u32, Vec<f64>>> = BTreeMap::new();

        for element in config.elements.values() {
            let ports = controllers.entry(element.controller.clone()).or_default();
            for p in 0..element.kind.num_ports() as u32 {
                ports.entry(element.port + p).or_insert_with(|| vec![0.0; len]);
            }
        }

        let mut dc_events: BTreeMap<&str, Vec<(u64, f64)>> = BTreeMap::new();

        for op in timeline.ops() {
            let Some(element) = config.elements.get(&op.element) else {
                continue;
            };
            let Some(ports) = controllers.get_mut(&element.controller) else {
                continue;
            };
            match &op.kind {
                TimedKind::Pulse { pulse, frame } | TimedKind::Acquire { pulse, frame } => {
                    for k in 0..op.duration_ns {
                        let t_abs = op.start_ns + k;
                        if t_abs >= window_ns {
                            break;
                        }
                        let (ei, eq) = pulse.envelope(k as f64);
                        let phase =
                            TAU * (element.intermediate_frequency * t_abs as f64 * 1e-9 + frame);
                        let (s, c) = phase.sin_cos();
                        let idx = t_abs as usize;
                        if let Some(i_port) = ports.get_mut(&element.port) {
                            i_port[idx] += ei * c - eq * s;
                        }
                        if let Some(q_port) = ports.get_mut(&(element.port + 1)) {
                            q_port[idx] += ei * s + eq * c;
                        }
                    }
                }
                TimedKind::DcOffset { offset } => {
                    dc_events
                        .entry(op.element.as_str())
                        .or_default()
                        .push((op.start_ns, *offset));
                }
            }
        }

        for (name, mut events) in dc_events {
            let Some(element) = config.elements.get(name) else {
                continue;
            };
            if element.kind != ElementKind::Flux {
                continue;
            }
            events.sort_by_key(|(t, _)| *t);
            let Some(trace) = controllers
                .get_mut(&element.controller)
                .and_then(|ports| ports.get_mut(&element.port))
            else {
                continue;
            };
            for (i, (start, level)) in events.iter().enumerate() {
                let end = events.get(i + 1).map_or(window_ns, |(t, _)| *t).min(window_ns);
                for sample in trace.iter_mut().take(end as usize).skip(*start as usize) {
                    *sample = *level;
                }
            }
        }

        Self {
            window_ns,
            controllers,
        }
    }

    /// Samples of one port.
    pub fn port(&self, controller: &str, port: u32) -> Option<&[f64]> {
        self.controllers
            .get(controller)
            .and_then(|ports| ports.get(&port))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Element;
    use crate::fixtures::test_config;
    use crate::instruction::{Phase, ReadoutMode, Ticks};
    use crate::program::{QubitBlock, Sweep};

    fn ramsey_block() -> QubitBlock {
        let mut b = QubitBlock::new("q1");
        b.body = vec![
            Operation::align(["q1.xy", "q1.resonator"]),
            Operation::play("x90", "q1.xy"),
            Operation::wait(Ticks::Sweep, "q1.xy"),
            Operation::frame_rotation_2pi(Phase::Turns(0.25), "q1.xy"),
            Operation::play("x90", "q1.xy"),
            Operation::align(["q1.xy", "q1.resonator"]),
            Operation::measure("readout", "q1.resonator", ReadoutMode::StateFlip, "state1"),
            Operation::reset_frame("q1.xy"),
        ];
        b
    }

    fn program(shots: u32) -> PulseProgram {
        PulseProgram::builder("ramsey")
            .shots(shots)
            .sweep(Sweep::new("t", vec![4, 10]))
            .block(ramsey_block())
            .averaged_stream("state1")
            .build(&test_config())
            .unwrap()
    }

    #[test]
    fn test_timeline_single_iteration() {
        let tl = Timeline::build(&program(1), &test_config(), 1).unwrap();
        let xy: Vec<_> = tl.on_element("q1.xy").collect();

        // x90 at 0, wait 16 ns, x90 at 56 with a quarter-turn frame
        assert_eq!(xy[0].start_ns, 0);
        assert_eq!(xy[1].start_ns, 56);
        match &xy[1].kind {
            TimedKind::Pulse { frame, .. } => assert!((frame - 0.25).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }

        // readout starts after the second x90 ends
        let rr: Vec<_> = tl.on_element("q1.resonator").collect();
        assert_eq!(rr[0].start_ns, 96);
    }

    #[test]
    fn test_frame_reset_between_iterations() {
        let tl = Timeline::build(&program(2), &test_config(), 10_000).unwrap();
        let frames: Vec<f64> = tl
            .on_element("q1.xy")
            .filter_map(|op| match op.kind {
                TimedKind::Pulse { frame, .. } => Some(frame),
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![0.0, 0.25, 0.0, 0.25, 0.0, 0.25, 0.0, 0.25]);
    }

    #[test]
    fn test_window_stops_lowering() {
        let tl = Timeline::build(&program(1_000_000), &test_config(), 2_000).unwrap();
        assert!(tl.end_ns() >= 2_000);
        assert!(tl.end_ns() < 4_000);
    }

    #[test]
    fn test_window_bounds() {
        for window in [0, MAX_SIMULATION_NS + 1, 1 << 40] {
            let err = Timeline::build(&program(1), &test_config(), window).unwrap_err();
            assert!(matches!(err, PulseError::InvalidWindow { window_ns, .. } if window_ns == window));
        }
        assert!(Timeline::build(&program(1), &test_config(), MAX_SIMULATION_NS).is_ok());
    }

    #[test]
    fn test_active_reset_follows_readout() {
        let mut block = ramsey_block();
        block
            .body
            .push(Operation::active_reset("readout", "x90", "q1.xy", "q1.resonator"));
        let program = PulseProgram::builder("ramsey")
            .shots(1)
            .sweep(Sweep::new("t", vec![4]))
            .block(block)
            .averaged_stream("state1")
            .build(&test_config())
            .unwrap();
        let tl = Timeline::build(&program, &test_config(), 1).unwrap();

        let rr: Vec<_> = tl.on_element("q1.resonator").map(|op| op.start_ns).collect();
        assert_eq!(rr, vec![96, 496]);
        let xy: Vec<_> = tl.on_element("q1.xy").map(|op| op.start_ns).collect();
        assert_eq!(xy, vec![0, 56, 896]);
        assert_eq!(tl.end_ns(), 936);
    }

    #[test]
    fn test_sequential_blocks_do_not_overlap() {
        let mut config = test_config();
        let xy = config.elements["q1.xy"].clone();
        let rr = config.elements["q1.resonator"].clone();
        config = config
            .with_element("q2.xy", Element { port: 5, ..xy })
            .with_element("q2.resonator", Element { port: 7, ..rr });

        let mut b2 = ramsey_block();
        b2.qubit = "q2".into();
        for op in b2.body.iter_mut() {
            for e in op.elements.iter_mut() {
                *e = e.replace("q1", "q2");
            }
            if let OperationKind::Measure { stream, .. } = &mut op.kind {
                *stream = "state2".into();
            }
        }

        let build = |multiplexed| {
            PulseProgram::builder("ramsey")
                .shots(1)
                .sweep(Sweep::new("t", vec![4]))
                .multiplexed(multiplexed)
                .block(ramsey_block())
                .block(b2.clone())
                .averaged_stream("state1")
                .averaged_stream("state2")
                .build(&config)
                .unwrap()
        };

        let par = Timeline::build(&build(true), &config, 1).unwrap();
        assert_eq!(par.on_element("q2.xy").next().unwrap().start_ns, 0);

        let seq = Timeline::build(&build(false), &config, 1).unwrap();
        let q1_end = seq.on_element("q1.resonator").last().unwrap();
        assert_eq!(
            seq.on_element("q2.xy").next().unwrap().start_ns,
            q1_end.start_ns + q1_end.duration_ns
        );
    }

    #[test]
    fn test_render_samples() {
        let mut config = test_config();
        config.elements.insert(
            "q1.z".into(),
            Element {
                kind: ElementKind::Flux,
                controller: "con2".into(),
                port: 1,
                intermediate_frequency: 0.0,
                operations: BTreeMap::new(),
            },
        );
        let mut block = ramsey_block();
        block.prologue.push(Operation::set_dc_offset(0.1, "q1.z"));
        let program = PulseProgram::builder("ramsey")
            .shots(1)
            .sweep(Sweep::new("t", vec![4]))
            .block(block)
            .averaged_stream("state1")
            .build(&config)
            .unwrap();

        let tl = Timeline::build(&program, &config, 600).unwrap();
        let wf = SampledWaveforms::render(&tl, &config, 600);

        assert_eq!(config.controllers(), vec!["con1", "con2"]);
        let i = wf.port("con1", 1).unwrap();
        assert_eq!(i.len(), 600);
        // drive is active during the first x90 and silent during the wait
        assert!(i[15..25].iter().any(|v| v.abs() > 1e-3));
        assert!(i[42..54].iter().all(|v| v.abs() < 1e-9));
        // flux holds the offset for the whole window
        assert!(wf.port("con2", 1).unwrap().iter().all(|v| (*v - 0.1).abs() < 1e-12));
        // readout pulse is a constant envelope
        let readout_peak = wf.port("con1", 3).unwrap()[100..500]
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(readout_peak > 0.015 && readout_peak <= 0.02 + 1e-12);
    }
}
