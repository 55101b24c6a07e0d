//! Supervisor state definition
//!
//! Fail-safe outputs, motion permission and watchdog gating are all a
//! function of the current state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::events::Event;

/// Supervisor states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SupervisorState {
    /// No active fault; motion allowed
    #[default]
    Normal,
    /// Fault surfaced; fail-safe about to be applied
    FaultDetected,
    /// Fail-safe applied, automatic recovery in progress
    Recovering,
    /// Emergency stop latched; only an acknowledgment leaves
    EmergencyStop,
    /// Automatic recovery gave up; only an explicit clear leaves
    ManualInterventionPending,
}

impl SupervisorState {
    /// Check if new moves may be accepted
    pub fn motion_allowed(&self) -> bool {
        matches!(self, SupervisorState::Normal)
    }

    /// Check if outputs are held in a de-energized latch
    pub fn is_latched(&self) -> bool {
        matches!(
            self,
            SupervisorState::EmergencyStop | SupervisorState::ManualInterventionPending
        )
    }

    /// Check if a fault is being handled
    pub fn is_faulted(&self) -> bool {
        !matches!(self, SupervisorState::Normal)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use SupervisorState::*;

        match (self, event) {
            // Emergency stop preempts everything
            (_, Event::EmergencyStop) => EmergencyStop,
            (EmergencyStop, Event::AcknowledgeEmergency) => Normal,
            (EmergencyStop, _) => self,

            // Normal transitions
            (Normal, Event::FaultDetected(_)) => FaultDetected,

            // FaultDetected transitions
            (FaultDetected, Event::RecoveryStarted) => Recovering,
            (FaultDetected, Event::RecoveryEscalated) => ManualInterventionPending,

            // Recovering transitions
            (Recovering, Event::FaultCleared) => Normal,
            (Recovering, Event::RecoveryEscalated) => ManualInterventionPending,

            // ManualInterventionPending transitions
            (ManualInterventionPending, Event::ClearManualIntervention) => Normal,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{FaultCode, FaultKind};

    const ALL_STATES: [SupervisorState; 5] = [
        SupervisorState::Normal,
        SupervisorState::FaultDetected,
        SupervisorState::Recovering,
        SupervisorState::EmergencyStop,
        SupervisorState::ManualInterventionPending,
    ];

    fn fault() -> Event {
        Event::FaultDetected(FaultCode::new(FaultKind::EncoderTimeout, 0, 0))
    }

    #[test]
    fn test_fault_path_to_recovery() {
        let state = SupervisorState::Normal.transition(fault());
        assert_eq!(state, SupervisorState::FaultDetected);
        let state = state.transition(Event::RecoveryStarted);
        assert_eq!(state, SupervisorState::Recovering);
        assert_eq!(state.transition(Event::FaultCleared), SupervisorState::Normal);
    }

    #[test]
    fn test_escalation_is_sticky() {
        let state = SupervisorState::Recovering.transition(Event::RecoveryEscalated);
        assert_eq!(state, SupervisorState::ManualInterventionPending);

        for event in [fault(), Event::FaultCleared, Event::RecoveryStarted, Event::AcknowledgeEmergency] {
            assert_eq!(state.transition(event), state);
        }
        assert_eq!(
            state.transition(Event::ClearManualIntervention),
            SupervisorState::Normal
        );
    }

    #[test]
    fn test_emergency_from_any_state() {
        for state in ALL_STATES {
            assert_eq!(
                state.transition(Event::EmergencyStop),
                SupervisorState::EmergencyStop
            );
        }
    }

    #[test]
    fn test_emergency_only_exits_on_acknowledge() {
        let state = SupervisorState::EmergencyStop;
        for event in [
            fault(),
            Event::FaultCleared,
            Event::RecoveryStarted,
            Event::RecoveryEscalated,
            Event::ClearManualIntervention,
        ] {
            assert_eq!(state.transition(event), SupervisorState::EmergencyStop);
        }
        assert_eq!(
            state.transition(Event::AcknowledgeEmergency),
            SupervisorState::Normal
        );
    }

    #[test]
    fn test_state_queries() {
        assert!(SupervisorState::Normal.motion_allowed());
        assert!(!SupervisorState::Recovering.motion_allowed());
        assert!(SupervisorState::EmergencyStop.is_latched());
        assert!(SupervisorState::ManualInterventionPending.is_latched());
        assert!(!SupervisorState::Recovering.is_latched());
        assert!(!SupervisorState::Normal.is_faulted());
    }
}
