//! Bounded automatic recovery
//!
//! Each fault category has its own attempt counter and backoff clock. A
//! category that runs out of attempts escalates to manual intervention and
//! stays there until an operator clears it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::RecoveryConfig;
use crate::traits::{ResetController, ResetError, Subsystem};

use super::elapsed_ms;
use super::fault::{FaultCategory, FaultCode, FaultKind};

/// How a fault is recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecoveryStrategy {
    /// Nothing to do automatically
    None,
    /// Re-initialize the faulting subsystem
    SoftReset(Subsystem),
    /// Restart the whole controller
    HardReset,
    /// Only an operator can recover
    ManualInterventionRequired,
}

impl RecoveryStrategy {
    /// Strategy for a fault
    pub const fn for_fault(fault: &FaultCode) -> Self {
        match fault.kind {
            FaultKind::MotorOvercurrent
            | FaultKind::MotorThermalShutdown
            | FaultKind::MotorUndervoltage
            | FaultKind::MotorStepLoss => RecoveryStrategy::SoftReset(Subsystem::Motor(fault.source)),
            FaultKind::MotorThermalWarning => RecoveryStrategy::None,
            FaultKind::EncoderTimeout | FaultKind::EncoderJump | FaultKind::EncoderFieldError => {
                RecoveryStrategy::SoftReset(Subsystem::Encoder(fault.source))
            }
            FaultKind::CommTimeout => RecoveryStrategy::SoftReset(Subsystem::Channel(fault.source)),
            FaultKind::ResourceExhaustion => RecoveryStrategy::HardReset,
        }
    }

    /// Check if the strategy can run without an operator
    pub const fn is_automatic(&self) -> bool {
        matches!(
            self,
            RecoveryStrategy::SoftReset(_) | RecoveryStrategy::HardReset
        )
    }
}

/// Per-category recovery bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecoveryState {
    /// Attempts made since the last success or clear
    pub attempt_count: u8,
    /// Time of the most recent attempt
    pub last_attempt_ms: Option<u32>,
    /// Retry budget exhausted; waiting for an operator
    pub escalated: bool,
}

/// Result of one recovery evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryOutcome {
    /// Reset requested; success is judged on the next clean tick
    Attempted {
        strategy: RecoveryStrategy,
        attempt: u8,
    },
    /// Reset refused by the collaborator; counts as a failed attempt
    Refused {
        strategy: RecoveryStrategy,
        attempt: u8,
        error: ResetError,
    },
    /// Too early for the next attempt
    Backoff { remaining_ms: u32 },
    /// Manual intervention required
    Escalated,
}

impl RecoveryOutcome {
    pub fn is_escalated(&self) -> bool {
        matches!(self, RecoveryOutcome::Escalated)
    }
}

/// Recovery state for every fault category
#[derive(Debug, Clone, Default)]
pub struct RecoveryManager {
    buckets: [RecoveryState; FaultCategory::COUNT],
}

impl RecoveryManager {
    /// Create a manager with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookkeeping for one category
    pub fn state(&self, category: FaultCategory) -> &RecoveryState {
        &self.buckets[category.index()]
    }

    /// Check if any category has escalated
    pub fn is_escalated(&self) -> bool {
        self.buckets.iter().any(|b| b.escalated)
    }

    /// Evaluate recovery for the current worst fault
    pub fn attempt<R>(
        &mut self,
        fault: &FaultCode,
        config: &RecoveryConfig,
        reset: &mut R,
        now_ms: u32,
    ) -> RecoveryOutcome
    where
        R: ResetController + ?Sized,
    {
        let strategy = RecoveryStrategy::for_fault(fault);
        let bucket = &mut self.buckets[fault.category().index()];

        if bucket.escalated {
            return RecoveryOutcome::Escalated;
        }

        if !strategy.is_automatic() {
            error!("No automatic recovery for {:?}", fault.kind);
            bucket.escalated = true;
            return RecoveryOutcome::Escalated;
        }

        if let Some(last) = bucket.last_attempt_ms {
            let backoff = config.backoff_ms(bucket.attempt_count);
            let elapsed = elapsed_ms(now_ms, last);
            if elapsed < backoff {
                return RecoveryOutcome::Backoff {
                    remaining_ms: backoff - elapsed,
                };
            }
        }

        if bucket.attempt_count >= config.max_attempts {
            error!(
                "Recovery of {:?} failed after {} attempts",
                fault.kind, bucket.attempt_count
            );
            bucket.escalated = true;
            return RecoveryOutcome::Escalated;
        }

        bucket.attempt_count += 1;
        bucket.last_attempt_ms = Some(now_ms);
        let attempt = bucket.attempt_count;

        let result = match strategy {
            RecoveryStrategy::SoftReset(subsystem) => reset.request_soft_reset(subsystem),
            RecoveryStrategy::HardReset => reset.request_hard_reset(),
            RecoveryStrategy::None | RecoveryStrategy::ManualInterventionRequired => Ok(()),
        };

        match result {
            Ok(()) => {
                info!("Recovery attempt {} for {:?}", attempt, fault.kind);
                RecoveryOutcome::Attempted { strategy, attempt }
            }
            Err(error) => {
                warn!("Recovery attempt {} refused: {:?}", attempt, error);
                RecoveryOutcome::Refused {
                    strategy,
                    attempt,
                    error,
                }
            }
        }
    }

    /// Stop automatic recovery for the category of `fault`
    pub fn escalate(&mut self, fault: &FaultCode) {
        self.buckets[fault.category().index()].escalated = true;
    }

    /// Reset every category that is still recovering automatically
    pub fn on_success(&mut self) {
        for bucket in self.buckets.iter_mut().filter(|b| !b.escalated) {
            *bucket = RecoveryState::default();
        }
    }

    /// Operator clear: reset every category, escalated or not
    pub fn clear(&mut self) {
        self.buckets = Default::default();
    }
}
