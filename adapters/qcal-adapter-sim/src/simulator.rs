//! Simulator backend implementation.

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use qcal_hal::{
    Availability, Backend, BackendConfig, BackendFactory, Capabilities, ExecutionResult,
    HalError, HalResult, Job, JobId, JobProgress, JobStatus,
};
use qcal_pulse::{ControlConfig, PulseProgram, SampledWaveforms, Timeline};

use crate::executor::{Executor, LiveProgress};
use crate::model::Device;

/// Job data for the simulator.
struct SimJob {
    job: Job,
    progress: Arc<LiveProgress>,
    result: Option<ExecutionResult>,
}

type JobTable = Arc<Mutex<FxHashMap<String, SimJob>>>;

/// Failed or cancelled jobs kept for `status` queries; older ones are dropped.
const MAX_FINISHED_JOBS: usize = 64;

/// Drop the oldest finished jobs nobody will collect a result from, keeping
/// at most `keep` of them.
fn prune_finished(jobs: &mut FxHashMap<String, SimJob>, keep: usize) {
    let mut finished: Vec<_> = jobs
        .iter()
        .filter(|(_, j)| j.job.status.is_terminal() && j.result.is_none())
        .map(|(id, j)| (j.job.finished_at.unwrap_or(j.job.submitted_at), id.clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
    debug!("pruned {excess} finished jobs");
}

fn lock(jobs: &Mutex<FxHashMap<String, SimJob>>) -> MutexGuard<'_, FxHashMap<String, SimJob>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local simulator backend.
///
/// Emulates a control cluster driving transmons described by a [`Device`].
/// Programs run shot by shot on a blocking worker thread, so the `n`
/// counter can be read live through [`Backend::progress`].
pub struct SimulatorBackend {
    config: BackendConfig,
    capabilities: Capabilities,
    device: Arc<Device>,
    seed: Option<u64>,
    submitted: AtomicU64,
    /// Jobs still running, completed jobs whose result has not been read,
    /// and the most recent failed or cancelled jobs.
    jobs: JobTable,
}

impl SimulatorBackend {
    /// Create a simulator with the given controllers and a default device.
    pub fn new(controllers: Vec<String>) -> Self {
        Self {
            config: BackendConfig::named("simulator"),
            capabilities: Capabilities::simulator(controllers),
            device: Arc::new(Device::default()),
            seed: None,
            submitted: AtomicU64::new(0),
            jobs: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Replace the simulated device.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Arc::new(device);
        self
    }

    /// Make shot noise reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The simulated device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn next_rng(&self) -> SmallRng {
        let k = self.submitted.fetch_add(1, Ordering::Relaxed);
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(k)),
            None => SmallRng::from_entropy(),
        }
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new(vec!["con1".into()])
    }
}

#[async_trait]
impl Backend for SimulatorBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn availability(&self) -> HalResult<Availability> {
        let pending = lock(&self.jobs)
            .values()
            .filter(|j| j.job.status.is_pending())
            .count();
        Ok(Availability::accepting(pending))
    }

    #[instrument(skip(self, program, config), fields(program = %program.name))]
    async fn submit(&self, program: &PulseProgram, config: &ControlConfig) -> HalResult<JobId> {
        self.validate(program, config).await?.into_result()?;

        let job_id = JobId::new(Uuid::new_v4().to_string());
        let progress = Arc::new(LiveProgress::new(program));
        let mut table = lock(&self.jobs);
        prune_finished(&mut table, MAX_FINISHED_JOBS);
        table.insert(
            job_id.0.clone(),
            SimJob {
                job: Job::queued(job_id.clone(), program.name.clone(), self.name()),
                progress: Arc::clone(&progress),
                result: None,
            },
        );
        drop(table);

        let jobs = Arc::clone(&self.jobs);
        let device = Arc::clone(&self.device);
        let program = program.clone();
        let config = config.clone();
        let rng = self.next_rng();
        let id = job_id.0.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(sim_job) = lock(&jobs).get_mut(&id) {
                sim_job.job.advance(JobStatus::Running);
            }
            let outcome = Executor::new(&program, &config, &device, rng).run(&progress);

            let mut jobs = lock(&jobs);
            let Some(sim_job) = jobs.get_mut(&id) else {
                return;
            };
            match outcome {
                Ok(result) => {
                    sim_job.result = Some(result);
                    sim_job.job.advance(JobStatus::Completed);
                }
                Err(HalError::JobCancelled) => {
                    sim_job.job.advance(JobStatus::Cancelled);
                }
                Err(e) => {
                    warn!("job {id} failed: {e}");
                    sim_job.job.advance(JobStatus::Failed(e.to_string()));
                }
            }
        });

        debug!("Submitted job: {}", job_id);
        Ok(job_id)
    }

    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
        lock(&self.jobs)
            .get(&job_id.0)
            .map(|j| j.job.status.clone())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    async fn progress(&self, job_id: &JobId) -> HalResult<JobProgress> {
        lock(&self.jobs)
            .get(&job_id.0)
            .map(|j| j.progress.snapshot())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    /// The job leaves the table once its result has been read.
    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
        let mut jobs = lock(&self.jobs);
        let sim_job = jobs
            .get(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        if sim_job.result.is_none() {
            return Err(HalError::NotCompleted(job_id.0.clone()));
        }
        jobs.remove(&job_id.0)
            .and_then(|j| j.result)
            .ok_or_else(|| HalError::NotCompleted(job_id.0.clone()))
    }

    async fn cancel(&self, job_id: &JobId) -> HalResult<()> {
        let mut jobs = lock(&self.jobs);
        let sim_job = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        sim_job.progress.cancel();
        sim_job.job.advance(JobStatus::Cancelled);
        Ok(())
    }

    #[instrument(skip(self, program, config), fields(program = %program.name))]
    async fn simulate(
        &self,
        program: &PulseProgram,
        config: &ControlConfig,
        duration_ns: u64,
    ) -> HalResult<SampledWaveforms> {
        self.validate(program, config).await?.into_result()?;
        let timeline = Timeline::build(program, config, duration_ns)?;
        debug!(
            ops = timeline.ops().len(),
            end_ns = timeline.end_ns(),
            "rendering {duration_ns} ns of samples"
        );
        Ok(SampledWaveforms::render(&timeline, config, duration_ns))
    }
}

impl BackendFactory for SimulatorBackend {
    fn from_config(config: BackendConfig) -> HalResult<Self> {
        let controllers = config
            .get("controllers")?
            .unwrap_or_else(|| vec!["con1".to_string()]);
        let device = config.get::<Device>("device")?.unwrap_or_default();
        let seed = config.get("seed")?;

        Ok(Self {
            capabilities: Capabilities::simulator(controllers),
            device: Arc::new(device),
            seed,
            submitted: AtomicU64::new(0),
            jobs: Arc::new(Mutex::new(FxHashMap::default())),
            config,
        })
    }
}
