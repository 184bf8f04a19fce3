//! Shot-by-shot execution of a pulse program on the simulated device.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use rand::Rng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use qcal_hal::{ExecutionResult, HalError, HalResult, JobProgress, StreamData};
use qcal_pulse::{
    ControlConfig, ElementKind, OperationKind, PulseProgram, QubitBlock, ReadoutMode, StreamKind,
    cycles_to_ns,
};

use crate::model::{Bloch, Device, QubitModel, named_rotation};

/// Counters shared between a running job and `Backend::progress`.
#[derive(Debug)]
pub(crate) struct LiveProgress {
    n: AtomicU64,
    blocks_done: AtomicU64,
    cancelled: AtomicBool,
    shots: u64,
    blocks: u64,
}

impl LiveProgress {
    pub(crate) fn new(program: &PulseProgram) -> Self {
        // multiplexed blocks share one averaging loop
        let blocks = if program.multiplexed {
            1
        } else {
            program.num_blocks() as u64
        };
        Self {
            n: AtomicU64::new(0),
            blocks_done: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            shots: u64::from(program.shots),
            blocks,
        }
    }

    pub(crate) fn snapshot(&self) -> JobProgress {
        JobProgress {
            n: self.n.load(Ordering::Relaxed),
            shots: self.shots,
            blocks_done: self.blocks_done.load(Ordering::Relaxed),
            blocks: self.blocks,
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Per-qubit state carried across shots. Unless the body ends in an active
/// reset, the qubit starts every shot in whatever state the last readout left it.
struct QubitRun<'a> {
    block: &'a QubitBlock,
    model: &'a QubitModel,
    flux_element: String,
    detuning_hz: f64,
    bloch: Bloch,
    frames: FxHashMap<String, f64>,
    references: FxHashMap<String, u8>,
}

pub(crate) struct Executor<'a> {
    program: &'a PulseProgram,
    config: &'a ControlConfig,
    device: &'a Device,
    rng: SmallRng,
    dc_offsets: FxHashMap<String, f64>,
    sums: BTreeMap<String, Vec<f64>>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        program: &'a PulseProgram,
        config: &'a ControlConfig,
        device: &'a Device,
        rng: SmallRng,
    ) -> Self {
        let sums = program
            .streams
            .iter()
            .filter_map(|s| match s.kind {
                StreamKind::AveragedBuffer { len } => Some((s.name.clone(), vec![0.0; len])),
                StreamKind::Counter => None,
            })
            .collect();
        Self {
            program,
            config,
            device,
            rng,
            dc_offsets: FxHashMap::default(),
            sums,
        }
    }

    /// Run every block and average the streams.
    pub(crate) fn run(mut self, progress: &LiveProgress) -> HalResult<ExecutionResult> {
        let start = Instant::now();
        let program = self.program;
        let device = self.device;
        let mut runs: Vec<QubitRun<'a>> = program
            .blocks
            .iter()
            .map(|block| QubitRun {
                block,
                model: device.model(&block.qubit),
                flux_element: device.flux_element(&block.qubit),
                detuning_hz: 0.0,
                bloch: Bloch::basis(0),
                frames: FxHashMap::default(),
                references: FxHashMap::default(),
            })
            .collect();

        if program.multiplexed {
            for run in &mut runs {
                self.prologue(run)?;
            }
            self.averaging_loop(&mut runs, progress)?;
            progress.blocks_done.store(1, Ordering::Relaxed);
        } else {
            for run in &mut runs {
                self.prologue(run)?;
                progress.n.store(0, Ordering::Relaxed);
                self.averaging_loop(std::slice::from_mut(run), progress)?;
                progress.blocks_done.fetch_add(1, Ordering::Relaxed);
            }
        }

        let shots = program.shots;
        let mut result = ExecutionResult::new(shots);
        for spec in &program.streams {
            let data = match spec.kind {
                StreamKind::Counter => StreamData::Counter(u64::from(shots.saturating_sub(1))),
                StreamKind::AveragedBuffer { .. } => {
                    let sums = self.sums.remove(&spec.name).unwrap_or_default();
                    StreamData::Buffer(sums.into_iter().map(|s| s / f64::from(shots)).collect())
                }
            };
            result = result.with_stream(spec.name.clone(), data);
        }

        let elapsed = start.elapsed();
        debug!(
            program = %program.name,
            iterations = program.total_iterations(),
            "simulation completed in {elapsed:?}"
        );
        Ok(result.with_execution_time(elapsed.as_millis() as u64))
    }

    fn averaging_loop(
        &mut self,
        runs: &mut [QubitRun<'a>],
        progress: &LiveProgress,
    ) -> HalResult<()> {
        let sweep = &self.program.sweep.values;
        for n in 0..self.program.shots {
            if progress.is_cancelled() {
                return Err(HalError::JobCancelled);
            }
            for (idx, &t) in sweep.iter().enumerate() {
                for run in runs.iter_mut() {
                    self.body(run, t, idx)?;
                }
            }
            progress.n.store(u64::from(n) + 1, Ordering::Relaxed);
            if n > 0 && n % 500 == 0 {
                trace!("completed {n} shots");
            }
        }
        Ok(())
    }

    fn prologue(&mut self, run: &mut QubitRun<'a>) -> HalResult<()> {
        let block = run.block;
        for op in &block.prologue {
            self.apply(run, &op.kind, &op.elements, 0, 0)?;
        }
        self.retune(run);
        Ok(())
    }

    fn body(&mut self, run: &mut QubitRun<'a>, sweep_value: u32, idx: usize) -> HalResult<()> {
        let block = run.block;
        for op in &block.body {
            self.apply(run, &op.kind, &op.elements, sweep_value, idx)?;
        }
        Ok(())
    }

    fn retune(&self, run: &mut QubitRun<'a>) {
        let flux = self
            .dc_offsets
            .get(&run.flux_element)
            .copied()
            .unwrap_or(0.0);
        run.detuning_hz = run.model.detuning_at(flux);
    }

    fn is_drive(&self, element: &str) -> HalResult<bool> {
        Ok(self.config.element(element)?.kind == ElementKind::Drive)
    }

    fn apply(
        &mut self,
        run: &mut QubitRun<'a>,
        kind: &OperationKind,
        elements: &[String],
        sweep_value: u32,
        idx: usize,
    ) -> HalResult<()> {
        match kind {
            OperationKind::Play { pulse } => {
                for e in elements {
                    if !self.is_drive(e)? {
                        continue;
                    }
                    let (axis, angle) = named_rotation(pulse).ok_or_else(|| {
                        HalError::Unsupported(format!("cannot emulate pulse '{pulse}' on '{e}'"))
                    })?;
                    let frame = run.frames.get(e).copied().unwrap_or(0.0);
                    run.bloch.rotate_equatorial(axis + TAU * frame, angle);
                }
            }
            OperationKind::Wait { duration } => {
                for e in elements {
                    if !self.is_drive(e)? {
                        continue;
                    }
                    let t_ns = cycles_to_ns(duration.resolve(sweep_value)) as f64;
                    run.bloch
                        .precess(TAU * run.detuning_hz * t_ns * 1e-9, run.model.coherence(t_ns));
                }
            }
            OperationKind::FrameRotation2Pi { phase } => {
                let turns = phase.resolve(sweep_value);
                for e in elements {
                    *run.frames.entry(e.clone()).or_default() += turns;
                }
            }
            OperationKind::ResetFrame => {
                for e in elements {
                    run.frames.insert(e.clone(), 0.0);
                }
            }
            OperationKind::Align => {}
            OperationKind::Measure { mode, stream, .. } => {
                let excited = self.rng.r#gen::<f64>() < run.bloch.excited_probability();
                let state = u8::from(excited);
                run.bloch = Bloch::basis(state);
                let value = match mode {
                    ReadoutMode::StateFlip => {
                        let reading = run.model.assign(state, &mut self.rng);
                        let reference = run.references.entry(stream.clone()).or_insert(0);
                        let flip = *reference ^ reading;
                        *reference = reading;
                        f64::from(flip)
                    }
                    ReadoutMode::IQuadrature => run.model.sample_i(state, &mut self.rng),
                };
                let buffer = self
                    .sums
                    .get_mut(stream)
                    .ok_or_else(|| HalError::MissingStream(stream.clone()))?;
                buffer[idx] += value;
            }
            OperationKind::ActiveReset { pi_pulse, .. } => {
                let [drive, _] = elements else {
                    return Err(HalError::Unsupported(format!(
                        "active reset on {} element(s)",
                        elements.len()
                    )));
                };
                let excited = self.rng.r#gen::<f64>() < run.bloch.excited_probability();
                let state = u8::from(excited);
                run.bloch = Bloch::basis(state);
                // feedback acts on the assigned reading, so readout errors leak through
                if run.model.assign(state, &mut self.rng) == 1 {
                    let (axis, angle) = named_rotation(pi_pulse).ok_or_else(|| {
                        HalError::Unsupported(format!("cannot emulate pulse '{pi_pulse}' on '{drive}'"))
                    })?;
                    let frame = run.frames.get(drive).copied().unwrap_or(0.0);
                    run.bloch.rotate_equatorial(axis + TAU * frame, angle);
                }
            }
            OperationKind::SetDcOffset { offset } => {
                for e in elements {
                    self.dc_offsets.insert(e.clone(), *offset);
                }
                self.retune(run);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{config, ramsey};
    use qcal_pulse::Operation;
    use rand::SeedableRng;

    fn ideal_device(detuning_hz: f64) -> Device {
        Device::default().with_qubit(
            "q1",
            QubitModel {
                detuning_hz,
                t2_star_ns: 1e9,
                readout_fidelity_0: 1.0,
                readout_fidelity_1: 1.0,
                ..QubitModel::default()
            },
        )
    }

    fn run(program: &PulseProgram, device: &Device) -> ExecutionResult {
        let config = config();
        let progress = LiveProgress::new(program);
        Executor::new(program, &config, device, SmallRng::seed_from_u64(11))
            .run(&progress)
            .unwrap()
    }

    #[test]
    fn test_flip_probability_follows_virtual_detuning() {
        // Resonant qubit: the fringe is the virtual detuning alone.
        let program = ramsey(ReadoutMode::StateFlip, 5e6, 2000);
        let result = run(&program, &ideal_device(0.0));
        let flips = result.buffer("state1").unwrap();

        for (&cycles, &p) in program.sweep.values.iter().zip(flips) {
            let t = cycles_to_ns(cycles) as f64 * 1e-9;
            let expected = 0.5 * (1.0 + (TAU * 5e6 * t).cos());
            assert!((p - expected).abs() < 0.05, "t={t}: {p} vs {expected}");
        }
        assert_eq!(result.counter("n").unwrap(), 1999);
    }

    #[test]
    fn test_qubit_detuning_cancels_virtual_detuning() {
        let program = ramsey(ReadoutMode::StateFlip, 2e6, 500);
        let result = run(&program, &ideal_device(2e6));
        for &p in result.buffer("state1").unwrap() {
            assert!(p > 0.95, "{p}");
        }
    }

    #[test]
    fn test_iq_mode_follows_fringe_after_reset() {
        let program = ramsey(ReadoutMode::IQuadrature, 5e6, 2000);
        let device = ideal_device(0.0);
        let model = device.model("q1");
        let result = run(&program, &device);
        let (ground, excited) = (model.iq_ground.re, model.iq_excited.re);

        for (&cycles, &i) in program.sweep.values.iter().zip(result.buffer("state1").unwrap()) {
            let t = cycles_to_ns(cycles) as f64 * 1e-9;
            let p = 0.5 * (1.0 + (TAU * 5e6 * t).cos());
            let expected = ground + (excited - ground) * p;
            assert!((i - expected).abs() < 2.5e-5, "t={t}: {i} vs {expected}");
        }
    }

    #[test]
    fn test_active_reset_returns_to_ground() {
        let program = ramsey(ReadoutMode::IQuadrature, 0.0, 1);
        let config = config();
        let device = ideal_device(0.0);
        let reset = program.blocks[0].body.last().unwrap();
        assert!(matches!(reset.kind, OperationKind::ActiveReset { .. }));

        let mut executor = Executor::new(&program, &config, &device, SmallRng::seed_from_u64(5));
        let mut qubit = QubitRun {
            block: &program.blocks[0],
            model: device.model("q1"),
            flux_element: device.flux_element("q1"),
            detuning_hz: 0.0,
            bloch: Bloch::basis(1),
            frames: FxHashMap::default(),
            references: FxHashMap::default(),
        };
        executor
            .apply(&mut qubit, &reset.kind, &reset.elements, 0, 0)
            .unwrap();
        assert!(qubit.bloch.excited_probability() < 1e-12);
    }

    #[test]
    fn test_cancel_stops_execution() {
        let program = ramsey(ReadoutMode::StateFlip, 0.0, 100);
        let config = config();
        let device = ideal_device(0.0);
        let progress = LiveProgress::new(&program);
        progress.cancel();
        let err = Executor::new(&program, &config, &device, SmallRng::seed_from_u64(1))
            .run(&progress)
            .unwrap_err();
        assert!(matches!(err, HalError::JobCancelled));
    }

    #[test]
    fn test_progress_counts_shots() {
        let program = ramsey(ReadoutMode::StateFlip, 0.0, 20);
        let config = config();
        let device = ideal_device(0.0);
        let progress = LiveProgress::new(&program);
        Executor::new(&program, &config, &device, SmallRng::seed_from_u64(3))
            .run(&progress)
            .unwrap();
        let snap = progress.snapshot();
        assert_eq!(snap.n, 20);
        assert_eq!(snap.blocks_done, 1);
        assert!((snap.fraction() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_gate_is_unsupported() {
        let mut program = ramsey(ReadoutMode::StateFlip, 0.0, 1);
        program.blocks[0].body[1] = Operation::play("x45", "q1.xy");
        let config = config();
        let device = ideal_device(0.0);
        let progress = LiveProgress::new(&program);
        let err = Executor::new(&program, &config, &device, SmallRng::seed_from_u64(3))
            .run(&progress)
            .unwrap_err();
        assert!(matches!(err, HalError::Unsupported(_)));
    }
}
