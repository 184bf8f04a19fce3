//! Error types for the pulse IR crate.

use thiserror::Error;

/// Errors that can occur while building or lowering a pulse program.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PulseError {
    /// Operation refers to an element missing from the control config.
    #[error("Element '{element}' not found in control config{}", format_context(.context))]
    UnknownElement {
        /// The element that was not found.
        element: String,
        /// Optional operation context.
        context: Option<String>,
    },

    /// Operation refers to a pulse missing from the control config.
    #[error("Pulse '{pulse}' not defined for element '{element}'")]
    UnknownPulse {
        /// The pulse name.
        pulse: String,
        /// The element it was played on.
        element: String,
    },

    /// Wait shorter than the hardware minimum.
    #[error("Wait of {cycles} clock cycles is below the minimum of {min} cycles")]
    WaitTooShort {
        /// Requested duration in clock cycles.
        cycles: u32,
        /// Minimum supported duration in clock cycles.
        min: u32,
    },

    /// Idle-time range cannot produce any sweep point.
    #[error("Invalid idle-time range: min {min_ns} ns, max {max_ns} ns ({reason})")]
    InvalidIdleRange {
        /// Lower bound in ns.
        min_ns: u32,
        /// Upper bound in ns.
        max_ns: u32,
        /// Why the range was rejected.
        reason: &'static str,
    },

    /// Sweep axis is empty or malformed.
    #[error("Invalid sweep: {0}")]
    InvalidSweep(String),

    /// Program has nothing to execute.
    #[error("Program '{0}' has no qubit blocks")]
    EmptyProgram(String),

    /// Simulation window outside `1..=MAX_SIMULATION_NS`.
    #[error("Simulation window of {window_ns} ns is outside 1..={max_ns} ns")]
    InvalidWindow {
        /// Requested window.
        window_ns: u64,
        /// Longest supported window.
        max_ns: u64,
    },

    /// Operation addresses the wrong kind or number of elements.
    #[error("'{op}' {reason}")]
    InvalidTargets {
        /// Operation name.
        op: &'static str,
        /// What is wrong with the targets.
        reason: String,
    },

    /// Stream declaration is inconsistent with the program.
    #[error("Invalid stream '{name}': {reason}")]
    InvalidStream {
        /// Stream name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

#[allow(clippy::ref_option)]
fn format_context(context: &Option<String>) -> String {
    match context {
        Some(op) => format!(" (in {op})"),
        None => String::new(),
    }
}

/// Result type for pulse IR operations.
pub type PulseResult<T> = Result<T, PulseError>;
