//! Configuration loading
//!
//! The safety configuration is embedded at build time and parsed with the
//! no_std parser in twinstep-core.

pub mod loader;

pub use loader::load_safety_config;
