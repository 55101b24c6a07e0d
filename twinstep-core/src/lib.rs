//! Board-agnostic core logic for the Twinstep dual-stepper firmware
//!
//! This crate contains all safety and motion logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware boundary traits (sensor snapshots, actuators, watchdog, resets)
//! - Fault detection for motor drivers, encoders, links and resources
//! - Fail-safe execution and bounded automatic recovery
//! - The periodic safety supervisor and its state machine
//! - Trapezoidal motion profile timing
//! - Configuration types and the configuration text parser

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod log;

pub mod config;
pub mod motion;
pub mod safety;
pub mod state;
pub mod traits;

/// Number of stepper motor drivers on the platform
pub const MOTOR_COUNT: usize = 2;

/// Number of magnetic position encoders on the platform
pub const ENCODER_COUNT: usize = 2;
