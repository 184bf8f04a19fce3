//! Ramsey command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use qcal_adapter_sim::SimulatorBackend;
use qcal_experiments::ramsey::{DataSource, RamseyNode, RamseyParameters};
use qcal_hal::{BackendConfig, BackendFactory};
use qcal_state::FluxPoint;

use super::common::{load_machine, node_store, print_done, progress_bar, update_progress};
use crate::StoreArgs;

/// Flags of `qcal ramsey`. Flags override the parameter file, which overrides
/// the defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct RamseyArgs {
    /// Parameter file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Qubits to calibrate, comma separated
    #[arg(short, long, value_delimiter = ',', conflicts_with = "active")]
    pub qubits: Option<Vec<String>>,

    /// Calibrate all active qubits
    #[arg(long)]
    pub active: bool,

    /// Averaging count
    #[arg(short = 'n', long)]
    pub num_averages: Option<u32>,

    /// Virtual detuning in MHz
    #[arg(long)]
    pub detuning_mhz: Option<f64>,

    /// First idle time in ns
    #[arg(long)]
    pub min_wait_ns: Option<u32>,

    /// Idle time bound in ns (exclusive)
    #[arg(long)]
    pub max_wait_ns: Option<u32>,

    /// Flux point (joint, independent)
    #[arg(long)]
    pub flux_point: Option<FluxPoint>,

    /// Save the I quadrature instead of the discriminated state
    #[arg(long)]
    pub no_state_discrimination: bool,

    /// Render the program's waveforms instead of running it
    #[arg(long)]
    pub simulate: bool,

    /// Simulated window in ns
    #[arg(long)]
    pub simulation_duration_ns: Option<u64>,

    /// Execution timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Analyse the dataset of a stored node instead of measuring
    #[arg(long)]
    pub load_data_id: Option<u64>,

    /// Run the qubits one after another
    #[arg(long)]
    pub sequential: bool,

    /// Simulator device model (JSON)
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Simulator seed
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RamseyArgs {
    /// Node parameters: defaults, then the parameter file, then the flags.
    pub fn parameters(&self) -> Result<RamseyParameters> {
        let mut params = match &self.config {
            Some(path) => RamseyParameters::from_yaml_file(path)
                .with_context(|| format!("Failed to read parameters: {}", path.display()))?,
            None => RamseyParameters::default(),
        };

        if self.active {
            params.qubits = None;
        } else if let Some(qubits) = &self.qubits {
            params.qubits = Some(qubits.clone());
        }
        if let Some(n) = self.num_averages {
            params.num_averages = n;
        }
        if let Some(mhz) = self.detuning_mhz {
            params.frequency_detuning_in_mhz = mhz;
        }
        if let Some(ns) = self.min_wait_ns {
            params.min_wait_time_in_ns = ns;
        }
        if let Some(ns) = self.max_wait_ns {
            params.max_wait_time_in_ns = ns;
        }
        if let Some(point) = self.flux_point {
            params.flux_point_joint_or_independent = point;
        }
        if self.no_state_discrimination {
            params.use_state_discrimination = false;
        }
        if self.simulate {
            params.simulate = true;
        }
        if let Some(ns) = self.simulation_duration_ns {
            params.simulation_duration_ns = ns;
        }
        if let Some(s) = self.timeout {
            params.timeout = s;
        }
        if self.load_data_id.is_some() {
            params.load_data_id = self.load_data_id;
        }
        if self.sequential {
            params.multiplexed = false;
        }

        params.validate()?;
        Ok(params)
    }

    fn backend(&self) -> Result<SimulatorBackend> {
        let mut config = BackendConfig::named("simulator");
        if let Some(path) = &self.device {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read device model: {}", path.display()))?;
            let device: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Invalid device model: {}", path.display()))?;
            config = config.option("device", device);
        }
        if let Some(seed) = self.seed {
            config = config.option("seed", seed.into());
        }
        Ok(SimulatorBackend::from_config(config)?)
    }
}

/// Execute the ramsey command.
pub async fn execute(store_args: &StoreArgs, args: RamseyArgs) -> Result<()> {
    let params = args.parameters()?;
    let (mut machine, state_path) = load_machine(store_args).await?;
    let store = node_store(store_args)?;
    let backend = args.backend()?;

    let qubits = machine.select_qubits(params.qubit_names())?;
    println!(
        "{} Ramsey with virtual Z on {} ({} averages, detuning {} MHz, {})",
        style("→").cyan().bold(),
        style(qubits.join(", ")).green(),
        params.num_averages,
        params.frequency_detuning_in_mhz,
        if params.multiplexed {
            "multiplexed"
        } else {
            "sequential"
        }
    );

    let bar = progress_bar()?;
    let run = RamseyNode::new(&backend, &store)
        .run(&mut machine, &params, |p| update_progress(&bar, p))
        .await;
    bar.finish_and_clear();
    let run = run?;

    match run.source {
        DataSource::Simulated => {
            print_done(format!(
                "Simulated {} ns of waveforms",
                params.simulation_duration_ns
            ));
        }
        DataSource::Loaded(id) => {
            print_done(format!("Analysed the dataset of node #{id}"));
        }
        DataSource::Measured => print_done("Measurement complete"),
    }

    let lines = run.report_lines();
    if !lines.is_empty() {
        println!();
        for line in lines {
            println!("  {line}");
        }
    }

    if !run.node.outcomes.is_empty() {
        println!();
        for (qubit, outcome) in &run.node.outcomes {
            let outcome = match outcome {
                qcal_state::Outcome::Successful => style(outcome.to_string()).green(),
                qcal_state::Outcome::Failed => style(outcome.to_string()).red(),
            };
            println!("  {}: {}", style(qubit).cyan(), outcome);
        }
    }

    if run.updated_state() {
        machine
            .save(&state_path)
            .await
            .with_context(|| format!("Failed to save machine state: {}", state_path.display()))?;
        println!(
            "\n  State updated: {}",
            style(state_path.display()).yellow()
        );
    }
    println!(
        "  Node #{} saved to {}",
        style(run.node.id).yellow(),
        style(run.folder.display()).dim()
    );

    Ok(())
}
