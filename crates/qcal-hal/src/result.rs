//! Execution results: the processed result streams of a finished program.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};

/// Data saved to one result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamData {
    /// Latest value of a counter.
    Counter(u64),
    /// Averaged buffer, one value per sweep point.
    Buffer(Vec<f64>),
}

/// Result of a completed program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Streams by name.
    pub streams: BTreeMap<String, StreamData>,
    /// Averaging count the program ran with.
    pub shots: u32,
    /// Wall-clock execution time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ExecutionResult {
    /// Create an empty result.
    pub fn new(shots: u32) -> Self {
        Self {
            streams: BTreeMap::new(),
            shots,
            execution_time_ms: None,
        }
    }

    /// Add a stream.
    pub fn with_stream(mut self, name: impl Into<String>, data: StreamData) -> Self {
        self.streams.insert(name.into(), data);
        self
    }

    /// Set the execution time.
    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Averaged buffer of a stream.
    pub fn buffer(&self, name: &str) -> HalResult<&[f64]> {
        match self.streams.get(name) {
            Some(StreamData::Buffer(values)) => Ok(values),
            Some(StreamData::Counter(_)) => Err(HalError::Backend(format!(
                "stream '{name}' is a counter, not a buffer"
            ))),
            None => Err(HalError::MissingStream(name.to_string())),
        }
    }

    /// Value of a counter stream.
    pub fn counter(&self, name: &str) -> HalResult<u64> {
        match self.streams.get(name) {
            Some(StreamData::Counter(n)) => Ok(*n),
            Some(StreamData::Buffer(_)) => Err(HalError::Backend(format!(
                "stream '{name}' is a buffer, not a counter"
            ))),
            None => Err(HalError::MissingStream(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_access() {
        let result = ExecutionResult::new(10)
            .with_stream("n", StreamData::Counter(9))
            .with_stream("state1", StreamData::Buffer(vec![0.1, 0.2]))
            .with_execution_time(5);

        assert_eq!(result.counter("n").unwrap(), 9);
        assert_eq!(result.buffer("state1").unwrap(), &[0.1, 0.2]);
        assert!(matches!(
            result.buffer("state2"),
            Err(HalError::MissingStream(_))
        ));
        assert!(result.buffer("n").is_err());
    }

    #[test]
    fn test_untagged_serde() {
        let result = ExecutionResult::new(1)
            .with_stream("n", StreamData::Counter(0))
            .with_stream("I1", StreamData::Buffer(vec![1.5]));
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
