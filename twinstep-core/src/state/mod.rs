//! Supervisor state machine
//!
//! The safety posture of the machine is a function of the current state and
//! an event. The machine is explicit, finite and deterministic.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::SupervisorState;
