//! Shared test fixtures.

use std::collections::BTreeMap;

use crate::config::{ControlConfig, Element, ElementKind, PulseDef, Waveform};

/// One qubit (`q1`) with an x90 drive pulse and a readout pulse.
pub(crate) fn test_config() -> ControlConfig {
    let mut xy_ops = BTreeMap::new();
    xy_ops.insert(
        "x90".to_string(),
        PulseDef {
            length_ns: 40,
            waveform: Waveform::Drag {
                amplitude: 0.1,
                sigma_ns: 8.0,
                alpha: 0.0,
            },
        },
    );
    let mut rr_ops = BTreeMap::new();
    rr_ops.insert(
        "readout".to_string(),
        PulseDef {
            length_ns: 400,
            waveform: Waveform::Constant { amplitude: 0.02 },
        },
    );
    ControlConfig::new()
        .with_element(
            "q1.xy",
            Element {
                kind: ElementKind::Drive,
                controller: "con1".into(),
                port: 1,
                intermediate_frequency: 50e6,
                operations: xy_ops,
            },
        )
        .with_element(
            "q1.resonator",
            Element {
                kind: ElementKind::Readout,
                controller: "con1".into(),
                port: 3,
                intermediate_frequency: 100e6,
                operations: rr_ops,
            },
        )
}
