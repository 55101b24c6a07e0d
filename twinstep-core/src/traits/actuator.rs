//! Actuation, watchdog and reset collaborators

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::safety::FailSafeAction;

/// Subsystem targeted by a soft reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Subsystem {
    /// Re-initialize one motor driver
    Motor(u8),
    /// Re-initialize one encoder
    Encoder(u8),
    /// Reset one communication channel
    Channel(u8),
}

/// Errors returned by reset requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetError {
    /// A reset of this subsystem is already in flight
    Busy,
    /// The subsystem cannot be reset from software
    Unsupported,
    /// The reset request could not be delivered
    Unavailable,
}

/// Motor output stage control
pub trait MotorActuator {
    /// Drive `action` into one motor
    ///
    /// Called only when the action for that motor changes.
    fn apply_motor_action(&mut self, motor: u8, action: FailSafeAction);

    /// Return one motor to normal operation
    fn release_motor(&mut self, motor: u8);

    /// Reduce (or restore) drive current after a thermal pre-warning
    fn set_current_derate(&mut self, motor: u8, derate: bool);
}

/// Hardware watchdog
pub trait Watchdog {
    /// Feed the watchdog
    fn service_watchdog(&mut self);
}

/// Subsystem and system reset requests
pub trait ResetController {
    /// Re-initialize one subsystem
    fn request_soft_reset(&mut self, subsystem: Subsystem) -> Result<(), ResetError>;

    /// Schedule a full restart
    fn request_hard_reset(&mut self) -> Result<(), ResetError>;
}
