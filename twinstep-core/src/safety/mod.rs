//! Safety supervision
//!
//! Fault detection for every monitored subsystem, worst-wins aggregation,
//! fail-safe actuation, bounded recovery and the periodic supervisor that
//! ties them together.

pub mod aggregator;
pub mod comm;
pub mod encoder;
pub mod estop;
pub mod executor;
pub mod fault;
pub mod history;
pub mod motor;
pub mod recovery;
pub mod resource;
pub mod snapshot;
pub mod supervisor;

pub use aggregator::{AggregateReport, FaultAggregator};
pub use comm::CommHealthTracker;
pub use encoder::{EncoderHealth, EncoderSample, EncoderValidator};
pub use estop::EmergencyStopLatch;
pub use executor::FailSafeExecutor;
pub use fault::{FailSafeAction, FaultCategory, FaultCode, FaultKind};
pub use history::{FaultHistory, FaultRecord, HISTORY_LEN};
pub use motor::{MotorDecode, MotorFaultDecoder, MotorStatus};
pub use recovery::{RecoveryManager, RecoveryOutcome, RecoveryState, RecoveryStrategy};
pub use resource::{ResourceMonitor, ResourceSnapshot};
pub use snapshot::SystemSafetyState;
pub use supervisor::{SafetySupervisor, SupervisorContext, SupervisorError, TickReport};

/// Largest amount a producer's timestamp may run ahead of `now`
const MAX_FUTURE_SKEW_MS: u32 = 1_000;

/// Milliseconds from `since_ms` to `now_ms` on a wrapping clock
///
/// A `since_ms` at most [`MAX_FUTURE_SKEW_MS`] in the future yields 0.
/// Anything else is an age, even past half the clock range; callers that
/// must keep reporting staleness beyond a full wrap latch it themselves.
pub(crate) fn elapsed_ms(now_ms: u32, since_ms: u32) -> u32 {
    let delta = now_ms.wrapping_sub(since_ms);
    if delta > u32::MAX - MAX_FUTURE_SKEW_MS {
        0
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_wrap() {
        assert_eq!(elapsed_ms(10, u32::MAX - 9), 20);
        assert_eq!(elapsed_ms(500, 100), 400);
    }

    #[test]
    fn test_elapsed_future_is_zero() {
        assert_eq!(elapsed_ms(100, 150), 0);
        assert_eq!(elapsed_ms(0, MAX_FUTURE_SKEW_MS), 0);
    }

    #[test]
    fn test_elapsed_past_half_range_is_an_age() {
        assert_eq!(elapsed_ms(2_147_484_648, 0), 2_147_484_648);
        assert_eq!(elapsed_ms(u32::MAX - MAX_FUTURE_SKEW_MS, 0), u32::MAX - MAX_FUTURE_SKEW_MS);
    }
}
