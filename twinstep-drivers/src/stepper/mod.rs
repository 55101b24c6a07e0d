//! Stepper driver implementations

pub mod tmc2209;

pub use tmc2209::{DrvStatus, GStat, Tmc2209Config, Tmc2209Driver, Tmc2209Error};
