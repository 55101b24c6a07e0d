//! Hardware abstraction traits
//!
//! These traits define the boundary between the safety core and the
//! board-specific collaborators. Reads are snapshot-style: the collaborator
//! has already fetched the data, so none of these calls block.

pub mod actuator;
pub mod sensor;

pub use actuator::{MotorActuator, ResetController, ResetError, Subsystem, Watchdog};
pub use sensor::SensorSource;

/// Everything the supervisor needs from the board in one bound
pub trait SafetyHardware: SensorSource + MotorActuator + Watchdog + ResetController {}

impl<T> SafetyHardware for T where T: SensorSource + MotorActuator + Watchdog + ResetController {}
