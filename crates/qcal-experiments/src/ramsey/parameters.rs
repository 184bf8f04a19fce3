//! Node parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use qcal_pulse::{MAX_SIMULATION_NS, PulseResult, idle_times};
use qcal_state::FluxPoint;

use crate::error::{ExperimentError, ExperimentResult};

fn default_qubits() -> Option<Vec<String>> {
    Some(vec!["qD1".to_string()])
}

/// Parameters of the Ramsey-with-virtual-Z node.
///
/// Every field has a default, so a parameter file only lists overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RamseyParameters {
    /// Qubits to calibrate. `None` or empty selects the active qubits.
    pub qubits: Option<Vec<String>>,
    /// Averaging count.
    pub num_averages: u32,
    /// Virtual detuning in MHz.
    pub frequency_detuning_in_mhz: f64,
    /// Shortest idle time in ns.
    pub min_wait_time_in_ns: u32,
    /// Idle-time bound in ns (exclusive).
    pub max_wait_time_in_ns: u32,
    /// Flux point the qubits are parked at.
    pub flux_point_joint_or_independent: FluxPoint,
    /// Save the discriminated state (true) or the I quadrature (false).
    pub use_state_discrimination: bool,
    /// Render the program's waveforms instead of running it.
    pub simulate: bool,
    /// Simulated window in ns, at most [`MAX_SIMULATION_NS`].
    pub simulation_duration_ns: u64,
    /// Execution timeout in seconds.
    pub timeout: u64,
    /// Analyse the dataset of this stored node instead of measuring.
    pub load_data_id: Option<u64>,
    /// Play all qubits at once (true) or one after another.
    pub multiplexed: bool,
}

impl Default for RamseyParameters {
    fn default() -> Self {
        Self {
            qubits: default_qubits(),
            num_averages: 1500,
            frequency_detuning_in_mhz: 5.0,
            min_wait_time_in_ns: 16,
            max_wait_time_in_ns: 5000,
            flux_point_joint_or_independent: FluxPoint::Joint,
            use_state_discrimination: true,
            simulate: false,
            simulation_duration_ns: 2500,
            timeout: 100,
            load_data_id: None,
            multiplexed: true,
        }
    }
}

impl RamseyParameters {
    /// Parse YAML overrides.
    pub fn from_yaml_str(yaml: &str) -> ExperimentResult<Self> {
        let params: Self = serde_yaml_ng::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    /// Read YAML overrides from a file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ExperimentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check ranges before anything is built.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.num_averages == 0 {
            return Err(ExperimentError::InvalidParameters(
                "num_averages must be positive".into(),
            ));
        }
        if !self.frequency_detuning_in_mhz.is_finite() || self.frequency_detuning_in_mhz <= 0.0 {
            return Err(ExperimentError::InvalidParameters(format!(
                "frequency_detuning_in_mhz must be positive, got {}",
                self.frequency_detuning_in_mhz
            )));
        }
        if !(1..=MAX_SIMULATION_NS).contains(&self.simulation_duration_ns) {
            return Err(ExperimentError::InvalidParameters(format!(
                "simulation_duration_ns must be in 1..={MAX_SIMULATION_NS}, got {}",
                self.simulation_duration_ns
            )));
        }
        if self.timeout == 0 {
            return Err(ExperimentError::InvalidParameters(
                "timeout must be positive".into(),
            ));
        }
        self.idle_cycles()?;
        Ok(())
    }

    /// Selected qubit names, empty when the active qubits should be used.
    pub fn qubit_names(&self) -> &[String] {
        self.qubits.as_deref().unwrap_or(&[])
    }

    /// Virtual detuning in Hz.
    pub fn detuning_hz(&self) -> f64 {
        self.frequency_detuning_in_mhz * 1e6
    }

    /// Idle times in clock cycles.
    pub fn idle_cycles(&self) -> PulseResult<Vec<u32>> {
        idle_times(self.min_wait_time_in_ns, self.max_wait_time_in_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = RamseyParameters::default();
        assert_eq!(params.qubit_names(), &["qD1".to_string()]);
        assert_eq!(params.detuning_hz(), 5e6);
        let idle = params.idle_cycles().unwrap();
        assert_eq!(idle.len(), 1246);
        assert_eq!((idle[0], idle[1245]), (4, 1249));
        params.validate().unwrap();
    }

    #[test]
    fn test_yaml_overrides() {
        let params = RamseyParameters::from_yaml_str(
            "qubits: [qD1, qD2]\nnum_averages: 200\nflux_point_joint_or_independent: independent\nmultiplexed: false\n",
        )
        .unwrap();
        assert_eq!(params.qubit_names().len(), 2);
        assert_eq!(params.num_averages, 200);
        assert_eq!(params.flux_point_joint_or_independent, FluxPoint::Independent);
        assert!(!params.multiplexed);
        assert_eq!(params.max_wait_time_in_ns, 5000);
    }

    #[test]
    fn test_null_qubits_means_active() {
        let params = RamseyParameters::from_yaml_str("qubits: null\n").unwrap();
        assert!(params.qubit_names().is_empty());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RamseyParameters::from_yaml_str("num_averages: 0\n"),
            Err(ExperimentError::InvalidParameters(_))
        ));
        assert!(matches!(
            RamseyParameters::from_yaml_str("min_wait_time_in_ns: 8\n"),
            Err(ExperimentError::Pulse(_))
        ));
        for window in ["0", "1000001", "1099511627776"] {
            let err = RamseyParameters::from_yaml_str(&format!("simulation_duration_ns: {window}\n"))
                .unwrap_err();
            assert!(
                err.to_string().contains("simulation_duration_ns"),
                "{window}: {err}"
            );
        }
        assert!(matches!(
            RamseyParameters::from_yaml_str("num_avg: 10\n"),
            Err(ExperimentError::Yaml(_))
        ));
    }
}
