//! Events that trigger supervisor state transitions

use crate::safety::FaultCode;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Detection events
    /// Aggregator surfaced a fault this tick
    FaultDetected(FaultCode),
    /// Aggregator came back clean
    FaultCleared,

    // Recovery events
    /// Fail-safe applied and an automatic recovery is under way
    RecoveryStarted,
    /// Retry budget exhausted or no automatic strategy exists
    RecoveryEscalated,

    // Operator events
    /// Emergency-stop input asserted
    EmergencyStop,
    /// Operator acknowledged the emergency stop
    AcknowledgeEmergency,
    /// Operator cleared a manual-intervention condition
    ClearManualIntervention,
}

impl Event {
    /// Check if this event comes from an operator
    pub fn is_operator_event(&self) -> bool {
        matches!(
            self,
            Event::EmergencyStop | Event::AcknowledgeEmergency | Event::ClearManualIntervention
        )
    }

    /// Check if this event is produced by fault detection or recovery
    pub fn is_fault_event(&self) -> bool {
        matches!(
            self,
            Event::FaultDetected(_)
                | Event::FaultCleared
                | Event::RecoveryStarted
                | Event::RecoveryEscalated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::FaultKind;

    #[test]
    fn test_operator_events() {
        assert!(Event::EmergencyStop.is_operator_event());
        assert!(Event::ClearManualIntervention.is_operator_event());
        assert!(!Event::FaultCleared.is_operator_event());
    }

    #[test]
    fn test_fault_events() {
        let code = FaultCode::new(FaultKind::CommTimeout, 0, 0);
        assert!(Event::FaultDetected(code).is_fault_event());
        assert!(Event::RecoveryEscalated.is_fault_event());
        assert!(!Event::AcknowledgeEmergency.is_fault_event());
    }
}
