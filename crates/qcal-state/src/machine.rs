//! Machine state: the calibrated parameters of every qubit on the chip.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use qcal_pulse::{ControlConfig, Element, ElementKind, PulseDef, Waveform};

use crate::error::{StateError, StateResult};

/// Where the flux lines park while a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxPoint {
    /// Every qubit at its joint offset.
    #[default]
    Joint,
    /// Target at its independent offset, all others at their minimum.
    Independent,
}

impl FromStr for FluxPoint {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "joint" => Ok(FluxPoint::Joint),
            "independent" => Ok(FluxPoint::Independent),
            other => Err(StateError::InvalidFluxPoint(other.to_string())),
        }
    }
}

impl fmt::Display for FluxPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxPoint::Joint => write!(f, "joint"),
            FluxPoint::Independent => write!(f, "independent"),
        }
    }
}

/// Position of a qubit on the chip, used to lay out figure grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridLocation {
    /// Column.
    pub col: u32,
    /// Row, counted from the bottom.
    pub row: u32,
}

/// XY drive line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveLine {
    /// Controller name.
    pub controller: String,
    /// First analog output (I; Q on the next port).
    pub port: u32,
    /// Drive intermediate frequency in Hz.
    pub intermediate_frequency: f64,
    /// Pulses by name (`x90`, `x180`, ...).
    pub operations: BTreeMap<String, PulseDef>,
}

/// Readout resonator line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutLine {
    /// Controller name.
    pub controller: String,
    /// First analog output.
    pub port: u32,
    /// Readout intermediate frequency in Hz.
    pub intermediate_frequency: f64,
    /// Pulses by name (`readout`).
    pub operations: BTreeMap<String, PulseDef>,
    /// Time for the resonator to ring down after a readout, in ns.
    #[serde(default)]
    pub depletion_time_ns: u32,
}

/// Flux bias line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxLine {
    /// Controller name.
    pub controller: String,
    /// Analog output.
    pub port: u32,
    /// Offset when all qubits sit at their joint point, in volts.
    pub joint_offset: f64,
    /// Offset when this qubit is calibrated alone, in volts.
    pub independent_offset: f64,
    /// Offset that parks the qubit out of the way, in volts.
    pub min_offset: f64,
}

/// One transmon and its control lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qubit {
    /// Drive line.
    pub xy: DriveLine,
    /// Readout line.
    pub resonator: ReadoutLine,
    /// Flux line, for tunable qubits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<FluxLine>,
    /// Chip position.
    #[serde(default)]
    pub grid_location: GridLocation,
    /// Ramsey dephasing time T2* in seconds.
    #[serde(default, rename = "T2ramsey", skip_serializing_if = "Option::is_none")]
    pub t2ramsey: Option<f64>,
}

/// Element names of a qubit in the generated control config.
pub fn xy_element(qubit: &str) -> String {
    format!("{qubit}.xy")
}

/// Readout element of a qubit.
pub fn resonator_element(qubit: &str) -> String {
    format!("{qubit}.resonator")
}

/// Flux element of a qubit.
pub fn flux_element(qubit: &str) -> String {
    format!("{qubit}.z")
}

/// The full machine state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Machine {
    /// Qubits by name.
    pub qubits: BTreeMap<String, Qubit>,
    /// Qubits used when a node names none.
    #[serde(default)]
    pub active_qubit_names: Vec<String>,
}

impl Machine {
    /// Load a machine from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::StateNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let machine: Machine = serde_json::from_str(&content)?;
        debug!(
            "loaded machine with {} qubits from {}",
            machine.qubits.len(),
            path.display()
        );
        Ok(machine)
    }

    /// Write the machine as pretty JSON, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> StateResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        debug!("saved machine to {}", path.display());
        Ok(())
    }

    /// Look up a qubit.
    pub fn qubit(&self, name: &str) -> StateResult<&Qubit> {
        self.qubits
            .get(name)
            .ok_or_else(|| StateError::UnknownQubit(name.to_string()))
    }

    /// Look up a qubit for modification.
    pub fn qubit_mut(&mut self, name: &str) -> StateResult<&mut Qubit> {
        self.qubits
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownQubit(name.to_string()))
    }

    /// Active qubits, in the order of `active_qubit_names`.
    pub fn active_qubits(&self) -> StateResult<Vec<&str>> {
        self.active_qubit_names
            .iter()
            .map(|name| self.qubit(name).map(|_| name.as_str()))
            .collect()
    }

    /// Resolve a node's qubit selection: the named qubits, or the active ones
    /// when none are named.
    pub fn select_qubits(&self, names: &[String]) -> StateResult<Vec<String>> {
        if names.is_empty() {
            return Ok(self.active_qubits()?.into_iter().map(String::from).collect());
        }
        names
            .iter()
            .map(|name| self.qubit(name).map(|_| name.clone()))
            .collect()
    }

    /// DC offsets of every flux line for calibrating `target` at `point`.
    pub fn flux_offsets(&self, target: &str, point: FluxPoint) -> StateResult<Vec<(String, f64)>> {
        self.qubit(target)?;
        Ok(self
            .qubits
            .iter()
            .filter_map(|(name, q)| q.z.as_ref().map(|z| (name, z)))
            .map(|(name, z)| {
                let offset = match point {
                    FluxPoint::Joint => z.joint_offset,
                    FluxPoint::Independent if name == target => z.independent_offset,
                    FluxPoint::Independent => z.min_offset,
                };
                (flux_element(name), offset)
            })
            .collect())
    }

    /// Control config with one drive, readout and (optional) flux element per qubit.
    pub fn generate_config(&self) -> ControlConfig {
        let mut config = ControlConfig::new();
        for (name, q) in &self.qubits {
            config = config
                .with_element(
                    xy_element(name),
                    Element {
                        kind: ElementKind::Drive,
                        controller: q.xy.controller.clone(),
                        port: q.xy.port,
                        intermediate_frequency: q.xy.intermediate_frequency,
                        operations: q.xy.operations.clone(),
                    },
                )
                .with_element(
                    resonator_element(name),
                    Element {
                        kind: ElementKind::Readout,
                        controller: q.resonator.controller.clone(),
                        port: q.resonator.port,
                        intermediate_frequency: q.resonator.intermediate_frequency,
                        operations: q.resonator.operations.clone(),
                    },
                );
            if let Some(z) = &q.z {
                config = config.with_element(
                    flux_element(name),
                    Element {
                        kind: ElementKind::Flux,
                        controller: z.controller.clone(),
                        port: z.port,
                        intermediate_frequency: 0.0,
                        operations: BTreeMap::new(),
                    },
                );
            }
        }
        config
    }

    /// A two-qubit chip (`qD1`, `qD2`) on one controller, for first runs
    /// against the simulator.
    pub fn example() -> Self {
        let qubit = |index: u32| {
            let mut xy_ops = BTreeMap::new();
            for (name, amplitude) in [("x90", 0.12), ("x180", 0.24), ("y90", 0.12)] {
                xy_ops.insert(
                    name.to_string(),
                    PulseDef {
                        length_ns: 40,
                        waveform: Waveform::Drag {
                            amplitude,
                            sigma_ns: 8.0,
                            alpha: 0.0,
                        },
                    },
                );
            }
            let mut rr_ops = BTreeMap::new();
            rr_ops.insert(
                "readout".to_string(),
                PulseDef {
                    length_ns: 1000,
                    waveform: Waveform::Constant { amplitude: 0.01 },
                },
            );
            Qubit {
                xy: DriveLine {
                    controller: "con1".into(),
                    port: 1 + 2 * (index - 1),
                    intermediate_frequency: -100e6 + 20e6 * f64::from(index),
                    operations: xy_ops,
                },
                resonator: ReadoutLine {
                    controller: "con1".into(),
                    port: 9,
                    intermediate_frequency: 50e6 + 25e6 * f64::from(index),
                    operations: rr_ops,
                    depletion_time_ns: 2000,
                },
                z: Some(FluxLine {
                    controller: "con1".into(),
                    port: 5 + index,
                    joint_offset: 0.0,
                    independent_offset: 0.0,
                    min_offset: -0.25,
                }),
                grid_location: GridLocation {
                    col: index - 1,
                    row: 0,
                },
                t2ramsey: None,
            }
        };

        let mut machine = Machine::default();
        for index in 1..=2 {
            let name = format!("qD{index}");
            machine.qubits.insert(name.clone(), qubit(index));
            machine.active_qubit_names.push(name);
        }
        machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flux_point_parse() {
        assert_eq!("joint".parse::<FluxPoint>().unwrap(), FluxPoint::Joint);
        assert_eq!("Independent".parse::<FluxPoint>().unwrap(), FluxPoint::Independent);
        assert!(matches!(
            "sweet".parse::<FluxPoint>(),
            Err(StateError::InvalidFluxPoint(_))
        ));
        assert_eq!(FluxPoint::Independent.to_string(), "independent");
    }

    #[test]
    fn test_select_qubits() {
        let machine = Machine::example();
        assert_eq!(machine.select_qubits(&[]).unwrap(), vec!["qD1", "qD2"]);
        assert_eq!(machine.select_qubits(&["qD2".into()]).unwrap(), vec!["qD2"]);
        assert!(matches!(
            machine.select_qubits(&["qX".into()]),
            Err(StateError::UnknownQubit(q)) if q == "qX"
        ));
    }

    #[test]
    fn test_flux_offsets() {
        let mut machine = Machine::example();
        machine.qubit_mut("qD1").unwrap().z.as_mut().unwrap().independent_offset = 0.05;
        machine.qubit_mut("qD2").unwrap().z.as_mut().unwrap().joint_offset = 0.01;

        let joint = machine.flux_offsets("qD1", FluxPoint::Joint).unwrap();
        assert_eq!(joint, vec![("qD1.z".into(), 0.0), ("qD2.z".into(), 0.01)]);

        let independent = machine.flux_offsets("qD1", FluxPoint::Independent).unwrap();
        assert_eq!(
            independent,
            vec![("qD1.z".into(), 0.05), ("qD2.z".into(), -0.25)]
        );
    }

    #[test]
    fn test_generate_config() {
        let machine = Machine::example();
        let config = machine.generate_config();

        assert_eq!(config.elements.len(), 6);
        let xy = config.element("qD2.xy").unwrap();
        assert_eq!(xy.kind, ElementKind::Drive);
        assert_eq!(xy.port, 3);
        assert!(config.pulse("qD1.xy", "x90").is_ok());
        assert!(config.pulse("qD1.resonator", "readout").is_ok());
        assert_eq!(config.element("qD1.z").unwrap().kind, ElementKind::Flux);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut machine = Machine::example();
        machine.qubit_mut("qD1").unwrap().t2ramsey = Some(2.5e-6);
        machine.save(&path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"T2ramsey\""));

        let loaded = Machine::load(&path).await.unwrap();
        assert_eq!(loaded, machine);
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let err = Machine::load(dir.path().join("none.json")).await.unwrap_err();
        assert!(matches!(err, StateError::StateNotFound(_)));
    }
}
