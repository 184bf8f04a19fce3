//! The node itself: build, run or reload, fit, plot, update and save.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use qcal_fit::DecayModel;
use qcal_hal::{Backend, HalError, JobProgress, wait_with_progress};
use qcal_state::{Artifact, Machine, NodeRecord, NodeStore, Outcome};

use crate::dataset::Dataset;
use crate::error::ExperimentResult;
use crate::figure::{FigureConfig, ramsey_title, render_ramsey_svg, render_waveforms_svg};
use crate::ramsey::analysis::{Analysis, analyze, update_machine};
use crate::ramsey::parameters::RamseyParameters;
use crate::ramsey::program::build_program;

/// Name under which runs are stored.
pub const NODE_NAME: &str = "ramsey_virtual_z";

/// Artifact keys and file names.
pub const DATASET_ARTIFACT: (&str, &str) = ("ds", "ds.json");
pub const FIGURE_ARTIFACT: (&str, &str) = ("figure", "figure.svg");
pub const FIGURE_GAUSSIAN_ARTIFACT: (&str, &str) = ("figure_gaussian", "figure_gaussian.svg");

/// Where the node's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Program rendered, not run.
    Simulated,
    /// Program executed on the backend.
    Measured,
    /// Dataset of a stored node.
    Loaded(u64),
}

/// Everything a run of the node produced.
#[derive(Debug, Clone)]
pub struct RamseyRun {
    /// The saved record.
    pub node: NodeRecord,
    /// Folder the record was saved to.
    pub folder: PathBuf,
    /// Data source.
    pub source: DataSource,
    /// Dataset, unless simulated.
    pub dataset: Option<Dataset>,
    /// Exponential-envelope fits; these drive the state update.
    pub analysis: Option<Analysis>,
    /// Gaussian-envelope fits.
    pub analysis_gaussian: Option<Analysis>,
}

impl RamseyRun {
    /// Console report of the exponential and Gaussian fits.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![];
        if let Some(analysis) = &self.analysis {
            lines.extend(analysis.report_lines());
        }
        if let Some(analysis) = &self.analysis_gaussian {
            lines.push("Gaussian envelope:".to_string());
            lines.extend(analysis.report_lines());
        }
        lines
    }

    /// Whether the machine state changed.
    pub fn updated_state(&self) -> bool {
        self.source == DataSource::Measured && self.node.successes() > 0
    }
}

/// Runs the Ramsey node against a backend and a node store.
pub struct RamseyNode<'a, B: Backend + ?Sized> {
    backend: &'a B,
    store: &'a NodeStore,
    figure: FigureConfig,
}

impl<'a, B: Backend + ?Sized> RamseyNode<'a, B> {
    /// Create a runner.
    pub fn new(backend: &'a B, store: &'a NodeStore) -> Self {
        Self {
            backend,
            store,
            figure: FigureConfig::default(),
        }
    }

    /// Use a different figure geometry.
    pub fn with_figure_config(mut self, figure: FigureConfig) -> Self {
        self.figure = figure;
        self
    }

    /// Run the node.
    ///
    /// `machine` is updated in place for every successfully fitted qubit of a
    /// measured dataset; the caller decides whether to persist it.
    pub async fn run<F>(
        &self,
        machine: &mut Machine,
        params: &RamseyParameters,
        on_progress: F,
    ) -> ExperimentResult<RamseyRun>
    where
        F: FnMut(&JobProgress) + Send,
    {
        params.validate()?;
        let qubits = machine.select_qubits(params.qubit_names())?;
        let idle_cycles = params.idle_cycles()?;
        let config = machine.generate_config();
        let program = build_program(machine, &config, params, &qubits, &idle_cycles)?;

        let id = self.store.next_node_id().await?;
        let mut node = NodeRecord::new(id, NODE_NAME, serde_json::to_value(params)?);
        info!(
            "Node #{} on {} qubit(s) ({}), {} idle times",
            id,
            qubits.len(),
            qubits.join(", "),
            idle_cycles.len()
        );

        if params.simulate {
            let samples = self
                .backend
                .simulate(&program, &config, params.simulation_duration_ns)
                .await?;
            let svg = render_waveforms_svg(&samples, &self.figure);
            node.machine = Some(machine.clone());
            let artifacts = [Artifact::new(
                FIGURE_ARTIFACT.0,
                FIGURE_ARTIFACT.1,
                svg.into_bytes(),
            )];
            let folder = self.store.save(&mut node, &artifacts).await?;
            return Ok(RamseyRun {
                node,
                folder,
                source: DataSource::Simulated,
                dataset: None,
                analysis: None,
                analysis_gaussian: None,
            });
        }

        let (dataset, source) = match params.load_data_id {
            Some(load_id) => {
                let bytes = self.store.read_artifact(load_id, DATASET_ARTIFACT.0).await?;
                let stored = Dataset::from_json(&bytes)?;
                info!("Loaded dataset of node #{}", load_id);
                (stored.select(&qubits)?, DataSource::Loaded(load_id))
            }
            None => {
                let availability = self.backend.availability().await?;
                if !availability.accepting {
                    return Err(HalError::Backend(format!(
                        "{} is not accepting jobs: {}",
                        self.backend.name(),
                        availability.message.unwrap_or_default()
                    ))
                    .into());
                }
                debug!(
                    "{} has {} pending job(s)",
                    self.backend.name(),
                    availability.pending_jobs
                );
                let job = self.backend.submit(&program, &config).await?;
                info!("Submitted job {} to {}", job, self.backend.name());
                let timeout = Duration::from_secs(params.timeout);
                let result = wait_with_progress(self.backend, &job, timeout, on_progress).await?;
                debug!("job {} finished in {:?} ms", job, result.execution_time_ms);
                let dataset = Dataset::from_result(
                    &result,
                    &qubits,
                    &idle_cycles,
                    params.use_state_discrimination,
                )?;
                (dataset, DataSource::Measured)
            }
        };

        let detuning_hz = params.detuning_hz();
        let analysis = analyze(&dataset, detuning_hz, DecayModel::Exponential);
        let analysis_gaussian = analyze(&dataset, detuning_hz, DecayModel::Gaussian);

        let title = ramsey_title(&dataset, node.created_at, id, params.multiplexed);
        let figure = render_ramsey_svg(&dataset, &analysis, machine, &title, &self.figure);
        let figure_gaussian =
            render_ramsey_svg(&dataset, &analysis_gaussian, machine, &title, &self.figure);

        node.outcomes = match source {
            DataSource::Measured => update_machine(machine, &analysis)?,
            _ => analysis
                .fits
                .iter()
                .map(|(q, fit)| {
                    let outcome = if fit.fitted().is_some() {
                        Outcome::Successful
                    } else {
                        Outcome::Failed
                    };
                    (q.clone(), outcome)
                })
                .collect(),
        };
        node.results = serde_json::json!({
            "fit_results": analysis.to_json()?,
            "fit_results_gaussian": analysis_gaussian.to_json()?,
            "initial_parameters": serde_json::to_value(params)?,
        });
        node.machine = Some(machine.clone());

        let artifacts = [
            Artifact::new(DATASET_ARTIFACT.0, DATASET_ARTIFACT.1, dataset.to_json()?),
            Artifact::new(FIGURE_ARTIFACT.0, FIGURE_ARTIFACT.1, figure.into_bytes()),
            Artifact::new(
                FIGURE_GAUSSIAN_ARTIFACT.0,
                FIGURE_GAUSSIAN_ARTIFACT.1,
                figure_gaussian.into_bytes(),
            ),
        ];
        let folder = self.store.save(&mut node, &artifacts).await?;
        info!(
            "Saved node #{} ({}/{} successful) to {}",
            id,
            node.successes(),
            node.outcomes.len(),
            folder.display()
        );

        Ok(RamseyRun {
            node,
            folder,
            source,
            dataset: Some(dataset),
            analysis: Some(analysis),
            analysis_gaussian: Some(analysis_gaussian),
        })
    }
}
