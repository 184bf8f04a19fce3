//! Labelled measurement data: one row per qubit, one column per idle time.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use qcal_hal::ExecutionResult;
use qcal_pulse::cycles_to_ns;

use crate::error::{ExperimentError, ExperimentResult};
use crate::ramsey::program::stream_name;

/// Measured variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variable {
    /// State-flip probability.
    #[serde(rename = "state")]
    State,
    /// Demodulated I quadrature, in volts.
    #[serde(rename = "I")]
    I,
}

impl Variable {
    /// Name as used in figure titles.
    pub fn name(self) -> &'static str {
        match self {
            Variable::State => "state",
            Variable::I => "I",
        }
    }

    /// Unit label.
    pub fn units(self) -> &'static str {
        match self {
            Variable::State => "",
            Variable::I => "V",
        }
    }
}

/// Averaged Ramsey data of several qubits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Qubit of each row.
    pub qubits: Vec<String>,
    /// Idle time coordinate in ns.
    pub time_ns: Array1<f64>,
    /// Measured variable.
    pub variable: Variable,
    /// `qubits × time` values.
    pub data: Array2<f64>,
    /// Coordinate attributes (`long_name`, `units`).
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl Dataset {
    /// Build from raw rows.
    pub fn new(
        qubits: Vec<String>,
        time_ns: Array1<f64>,
        variable: Variable,
        data: Array2<f64>,
    ) -> ExperimentResult<Self> {
        if data.dim() != (qubits.len(), time_ns.len()) {
            return Err(ExperimentError::Dataset(format!(
                "data has shape {:?}, expected ({}, {})",
                data.dim(),
                qubits.len(),
                time_ns.len()
            )));
        }
        let mut attrs = BTreeMap::new();
        attrs.insert("long_name".into(), "idle_time".into());
        attrs.insert("units".into(), "ns".into());
        Ok(Self {
            qubits,
            time_ns,
            variable,
            data,
            attrs,
        })
    }

    /// Collect the averaged streams of a finished program.
    ///
    /// Row `i` comes from stream `state{i+1}` (or `I{i+1}`).
    pub fn from_result(
        result: &ExecutionResult,
        qubits: &[String],
        idle_cycles: &[u32],
        use_state_discrimination: bool,
    ) -> ExperimentResult<Self> {
        let variable = if use_state_discrimination {
            Variable::State
        } else {
            Variable::I
        };
        let time_ns: Array1<f64> = idle_cycles.iter().map(|&c| cycles_to_ns(c) as f64).collect();
        let mut data = Array2::zeros((qubits.len(), idle_cycles.len()));
        for (i, mut row) in data.axis_iter_mut(Axis(0)).enumerate() {
            let name = stream_name(i, use_state_discrimination);
            let buffer = result.buffer(&name)?;
            if buffer.len() != idle_cycles.len() {
                return Err(ExperimentError::Dataset(format!(
                    "stream '{name}' has {} points, expected {}",
                    buffer.len(),
                    idle_cycles.len()
                )));
            }
            row.assign(&ArrayView1::from(buffer));
        }
        Self::new(qubits.to_vec(), time_ns, variable, data)
    }

    /// Row of `qubit`.
    pub fn row(&self, qubit: &str) -> ExperimentResult<ArrayView1<'_, f64>> {
        let index = self
            .qubits
            .iter()
            .position(|q| q == qubit)
            .ok_or_else(|| ExperimentError::Dataset(format!("no data for qubit '{qubit}'")))?;
        Ok(self.data.row(index))
    }

    /// Keep only `qubits`, in that order.
    pub fn select(&self, qubits: &[String]) -> ExperimentResult<Self> {
        let mut data = Array2::zeros((qubits.len(), self.time_ns.len()));
        for (q, mut row) in qubits.iter().zip(data.axis_iter_mut(Axis(0))) {
            row.assign(&self.row(q)?);
        }
        Ok(Self {
            qubits: qubits.to_vec(),
            time_ns: self.time_ns.clone(),
            variable: self.variable,
            data,
            attrs: self.attrs.clone(),
        })
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> ExperimentResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ExperimentResult<Self> {
        let ds: Self = serde_json::from_slice(bytes)?;
        if ds.data.dim() != (ds.qubits.len(), ds.time_ns.len()) {
            return Err(ExperimentError::Dataset(
                "stored data does not match its coordinates".into(),
            ));
        }
        Ok(ds)
    }
}
