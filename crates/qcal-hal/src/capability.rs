//! Backend capability introspection.

use serde::{Deserialize, Serialize};

/// Hardware capabilities of a control backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the backend.
    pub name: String,
    /// Controllers available to programs.
    pub controllers: Vec<String>,
    /// Maximum averaging count per program.
    pub max_shots: u32,
    /// Maximum total body iterations per program. `None` means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    /// Sequencer clock period in ns.
    pub clock_period_ns: u32,
    /// Whether this is a simulator (`true`) or real hardware (`false`).
    pub is_simulator: bool,
    /// Capability flags: `"simulate"`, `"state_discrimination"`, `"live_progress"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl Capabilities {
    /// Create capabilities for the local simulator.
    pub fn simulator(controllers: Vec<String>) -> Self {
        Self {
            name: "simulator".into(),
            controllers,
            max_shots: 1_000_000,
            max_iterations: Some(50_000_000),
            clock_period_ns: qcal_pulse::CLOCK_CYCLE_NS,
            is_simulator: true,
            features: vec![
                "simulate".into(),
                "state_discrimination".into(),
                "live_progress".into(),
            ],
        }
    }

    /// Whether a feature flag is set.
    pub fn supports(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}
