//! Fail-safe actuation
//!
//! Applies the action mapped to a fault. The executor remembers what each
//! motor was last driven to, so a persisting fault does not re-actuate, and
//! while a fault is latched the outputs only ever move to a more severe
//! action.

use crate::traits::MotorActuator;
use crate::MOTOR_COUNT;

use super::fault::{FailSafeAction, FaultCode};
use super::snapshot::SystemSafetyState;

/// Applies and latches fail-safe actions
#[derive(Debug, Clone, Default)]
pub struct FailSafeExecutor {
    /// Action currently held on each motor
    applied: [Option<FailSafeAction>; MOTOR_COUNT],
    /// Most severe action applied since the last release
    latched: Option<FailSafeAction>,
}

impl FailSafeExecutor {
    /// Create an executor with all outputs released
    pub fn new() -> Self {
        Self::default()
    }

    /// Action currently latched, if any
    pub fn latched(&self) -> Option<FailSafeAction> {
        self.latched
    }

    /// Action currently held on `motor`
    pub fn applied(&self, motor: u8) -> Option<FailSafeAction> {
        self.applied.get(motor as usize).copied().flatten()
    }

    /// Apply the fail-safe action for `fault`
    ///
    /// Records the fault as the stop reason, keeping the original timestamp
    /// while the same condition persists, and returns the action that is now
    /// in effect.
    pub fn execute<A>(
        &mut self,
        fault: &FaultCode,
        actuator: &mut A,
        state: &mut SystemSafetyState,
        now_ms: u32,
    ) -> FailSafeAction
    where
        A: MotorActuator + ?Sized,
    {
        let requested = fault.kind.action();
        let effective = self.apply(requested, actuator);

        if requested == FailSafeAction::SystemReset && !state.restart_scheduled {
            warn!("Full restart scheduled");
            state.restart_scheduled = true;
        }
        let persisting = state
            .last_stop_reason
            .is_some_and(|reason| reason.same_condition(fault));
        if !persisting {
            state.last_stop_reason = Some(*fault);
            state.last_stop_ms = Some(now_ms);
        }
        effective
    }

    /// Drive `action` into every motor, never relaxing a latched action
    pub fn apply<A>(&mut self, action: FailSafeAction, actuator: &mut A) -> FailSafeAction
    where
        A: MotorActuator + ?Sized,
    {
        let effective = match self.latched {
            Some(latched) if latched.severity() > action.severity() => latched,
            _ => action,
        };
        self.latched = Some(effective);

        let motor_action = effective.motor_action();
        for (motor, applied) in self.applied.iter_mut().enumerate() {
            if *applied != Some(motor_action) {
                actuator.apply_motor_action(motor as u8, motor_action);
                *applied = Some(motor_action);
            }
        }
        effective
    }

    /// Release every motor and clear the latch
    pub fn release<A>(&mut self, actuator: &mut A)
    where
        A: MotorActuator + ?Sized,
    {
        for (motor, applied) in self.applied.iter_mut().enumerate() {
            if applied.take().is_some() {
                actuator.release_motor(motor as u8);
            }
        }
        self.latched = None;
    }
}
