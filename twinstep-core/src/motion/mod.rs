//! Motion profiles
//!
//! Trapezoidal velocity profile timing and per-motor move tracking.

pub mod engine;
pub mod profile;

pub use engine::{MotionHandle, MotionProfileEngine, RejectReason};
pub use profile::{MotionTiming, Phase, ProfileShape};
