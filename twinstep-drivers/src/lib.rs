//! Hardware driver implementations
//!
//! Concrete drivers that translate between chip registers and the
//! board-independent types of twinstep-core:
//!
//! - Stepper drivers (TMC2209 over single-wire UART)
//! - Magnetic position encoders (AS5600 over I2C)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod encoder;
pub mod stepper;
