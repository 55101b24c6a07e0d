//! Magnetic position encoder implementations

pub mod as5600;

pub use as5600::{As5600, As5600Error, MagnetStatus};
