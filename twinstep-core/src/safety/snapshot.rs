//! Published safety state

use crate::state::SupervisorState;
use crate::MOTOR_COUNT;

use super::fault::FaultCode;

/// Read-only view of the supervisor, copied out once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemSafetyState {
    /// Current supervisor state
    pub supervisor_state: SupervisorState,
    /// Emergency stop is latched
    pub emergency_stop_active: bool,
    /// An operator must clear a fault before motion resumes
    pub recovery_required: bool,
    /// Worst fault surfaced on the last tick
    pub active_fault: Option<FaultCode>,
    /// Fault that caused the most recent fail-safe action
    pub last_stop_reason: Option<FaultCode>,
    /// When that action was applied
    pub last_stop_ms: Option<u32>,
    /// When the emergency stop was last latched
    pub last_emergency_ms: Option<u32>,
    /// A full restart has been requested
    pub restart_scheduled: bool,
    /// Motors running on reduced current after a thermal pre-warning
    pub derated: [bool; MOTOR_COUNT],
}

impl SystemSafetyState {
    /// Check if the machine may move
    pub fn is_operational(&self) -> bool {
        self.supervisor_state.motion_allowed() && !self.emergency_stop_active
    }
}
