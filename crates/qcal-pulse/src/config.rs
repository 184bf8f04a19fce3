//! Control configuration: the elements a program can address and the pulses
//! each of them knows how to play.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

/// What an element drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Qubit XY drive line (I/Q pair).
    Drive,
    /// Readout resonator (I/Q pair, with acquisition).
    Readout,
    /// Flux bias line (single DC-coupled port).
    Flux,
}

impl ElementKind {
    /// Number of analog output ports the element occupies.
    pub fn num_ports(self) -> usize {
        match self {
            ElementKind::Drive | ElementKind::Readout => 2,
            ElementKind::Flux => 1,
        }
    }
}

/// Pulse envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Waveform {
    /// Flat-top envelope.
    Constant {
        /// Amplitude in volts.
        amplitude: f64,
    },
    /// Gaussian envelope with optional DRAG quadrature.
    Drag {
        /// Peak amplitude in volts.
        amplitude: f64,
        /// Standard deviation in ns.
        sigma_ns: f64,
        /// DRAG coefficient (0 disables the derivative quadrature).
        #[serde(default)]
        alpha: f64,
    },
}

/// A named pulse an element can play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseDef {
    /// Length in ns. Must be a multiple of the clock cycle.
    pub length_ns: u32,
    /// Envelope.
    pub waveform: Waveform,
}

impl PulseDef {
    /// Envelope sample `(I, Q)` at `t` ns from the pulse start.
    pub fn envelope(&self, t: f64) -> (f64, f64) {
        match self.waveform {
            Waveform::Constant { amplitude } => (amplitude, 0.0),
            Waveform::Drag {
                amplitude,
                sigma_ns,
                alpha,
            } => {
                let centre = f64::from(self.length_ns) / 2.0;
                let x = t - centre;
                let g = amplitude * (-x * x / (2.0 * sigma_ns * sigma_ns)).exp();
                let dg = -x / (sigma_ns * sigma_ns) * g;
                (g, alpha * dg / (2.0 * PI))
            }
        }
    }
}

/// A controllable element bound to analog outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// What the element drives.
    pub kind: ElementKind,
    /// Controller the element's outputs live on (e.g. `con1`).
    pub controller: String,
    /// First analog output port. I/Q elements use this port and the next one.
    pub port: u32,
    /// Intermediate (modulation) frequency in Hz.
    #[serde(default)]
    pub intermediate_frequency: f64,
    /// Pulses this element can play, by operation name.
    #[serde(default)]
    pub operations: BTreeMap<String, PulseDef>,
}

impl Element {
    /// Look up a pulse by operation name.
    pub fn pulse(&self, name: &str) -> Option<&PulseDef> {
        self.operations.get(name)
    }
}

/// The full element/pulse table a pulse program is compiled against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Elements by name.
    pub elements: BTreeMap<String, Element>,
}

impl ControlConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element.
    pub fn with_element(mut self, name: impl Into<String>, element: Element) -> Self {
        self.elements.insert(name.into(), element);
        self
    }

    /// Look up an element.
    pub fn element(&self, name: &str) -> PulseResult<&Element> {
        self.elements
            .get(name)
            .ok_or_else(|| PulseError::UnknownElement {
                element: name.to_string(),
                context: None,
            })
    }

    /// Look up a pulse on an element.
    pub fn pulse(&self, element: &str, pulse: &str) -> PulseResult<&PulseDef> {
        self.element(element)?
            .pulse(pulse)
            .ok_or_else(|| PulseError::UnknownPulse {
                pulse: pulse.to_string(),
                element: element.to_string(),
            })
    }

    /// Names of all controllers referenced by the config, sorted.
    pub fn controllers(&self) -> Vec<&str> {
        let mut cons: Vec<&str> = self
            .elements
            .values()
            .map(|e| e.controller.as_str())
            .collect();
        cons.sort_unstable();
        cons.dedup();
        cons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x90() -> PulseDef {
        PulseDef {
            length_ns: 40,
            waveform: Waveform::Drag {
                amplitude: 0.1,
                sigma_ns: 8.0,
                alpha: 0.0,
            },
        }
    }

    #[test]
    fn test_drag_envelope_peaks_at_centre() {
        let p = x90();
        let (i_mid, q_mid) = p.envelope(20.0);
        assert_relative_eq!(i_mid, 0.1);
        assert_relative_eq!(q_mid, 0.0);
        assert!(p.envelope(0.0).0 < i_mid);
    }

    #[test]
    fn test_lookup_errors() {
        let mut el = Element {
            kind: ElementKind::Drive,
            controller: "con1".into(),
            port: 1,
            intermediate_frequency: 50e6,
            operations: BTreeMap::new(),
        };
        el.operations.insert("x90".into(), x90());
        let config = ControlConfig::new().with_element("q1.xy", el);

        assert!(config.pulse("q1.xy", "x90").is_ok());
        assert!(matches!(
            config.pulse("q1.xy", "x180"),
            Err(PulseError::UnknownPulse { .. })
        ));
        assert!(matches!(
            config.element("q2.xy"),
            Err(PulseError::UnknownElement { .. })
        ));
        assert_eq!(config.controllers(), vec!["con1"]);
    }
}
