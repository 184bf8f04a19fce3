//! Clock-cycle and time-unit helpers.
//!
//! The control hardware runs on a 250 MHz sequencer clock: every timed
//! instruction is expressed in clock cycles of 4 ns.

use crate::error::{PulseError, PulseResult};

/// Duration of one sequencer clock cycle in nanoseconds.
pub const CLOCK_CYCLE_NS: u32 = 4;

/// Shortest wait the sequencer can play, in clock cycles.
pub const MIN_WAIT_CYCLES: u32 = 4;

/// Analog output sample rate used when rendering waveforms (samples per ns).
pub const SAMPLES_PER_NS: u32 = 1;

/// Convert a duration in nanoseconds to whole clock cycles (floor).
pub fn ns_to_cycles(ns: u32) -> u32 {
    ns / CLOCK_CYCLE_NS
}

/// Convert clock cycles to nanoseconds.
pub fn cycles_to_ns(cycles: u32) -> u64 {
    u64::from(cycles) * u64::from(CLOCK_CYCLE_NS)
}

/// Longest window `simulate` renders, in ns (one sample per ns and port).
pub const MAX_SIMULATION_NS: u64 = 1_000_000;

/// Idle-time sweep in clock cycles.
///
/// Steps from `min_ns` (inclusive) to `max_ns` (exclusive) in 4 ns steps and
/// converts each point to clock cycles. `min_ns` must allow the minimum wait
/// of [`MIN_WAIT_CYCLES`].
pub fn idle_times(min_ns: u32, max_ns: u32) -> PulseResult<Vec<u32>> {
    if min_ns < MIN_WAIT_CYCLES * CLOCK_CYCLE_NS {
        return Err(PulseError::InvalidIdleRange {
            min_ns,
            max_ns,
            reason: "minimum wait is 4 clock cycles (16 ns)",
        });
    }
    if max_ns <= min_ns {
        return Err(PulseError::InvalidIdleRange {
            min_ns,
            max_ns,
            reason: "max must exceed min",
        });
    }

    Ok((min_ns..max_ns)
        .step_by(CLOCK_CYCLE_NS as usize)
        .map(ns_to_cycles)
        .collect())
}

/// Virtual-Z phase (in turns) accumulated by `detuning_hz` over `cycles`.
///
/// This is `detuning * 1e-9 * 4 * t`, wrapped into `[0, 1)`.
pub fn virtual_z_turns(detuning_hz: f64, cycles: u32) -> f64 {
    (detuning_hz * 1e-9 * cycles_to_ns(cycles) as f64).rem_euclid(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_ramsey_sweep() {
        let t = idle_times(16, 5000).unwrap();
        assert_eq!(t.len(), 1246);
        assert_eq!(t[0], 4);
        assert_eq!(*t.last().unwrap(), 1249);
    }

    #[test]
    fn test_unaligned_min_floors() {
        let t = idle_times(18, 30).unwrap();
        assert_eq!(t, vec![4, 5, 6]);
    }

    #[test]
    fn test_rejects_short_min() {
        assert!(matches!(
            idle_times(8, 100),
            Err(PulseError::InvalidIdleRange { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(idle_times(100, 100).is_err());
        assert!(idle_times(200, 100).is_err());
    }

    #[test]
    fn test_virtual_z_turns() {
        // 5 MHz over 40 ns is a fifth of a turn
        assert_relative_eq!(virtual_z_turns(5e6, 10), 0.2, epsilon = 1e-9);
        assert_relative_eq!(virtual_z_turns(5e6, 60), 0.2, epsilon = 1e-9);
        assert_relative_eq!(virtual_z_turns(-5e6, 10), 0.8, epsilon = 1e-9);
    }

    proptest! {
        #[test]
        fn idle_times_are_strictly_increasing(min in 16u32..400, span in 4u32..4000) {
            let t = idle_times(min, min + span).unwrap();
            prop_assert!(!t.is_empty());
            prop_assert!(t.windows(2).all(|w| w[1] == w[0] + 1));
            prop_assert!(t[0] >= MIN_WAIT_CYCLES);
        }
    }
}
