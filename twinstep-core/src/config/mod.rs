//! Configuration types
//!
//! Board-agnostic safety configuration and the text parser that builds it
//! from the embedded `safety.toml`.

pub mod limits;
pub mod toml;

pub use limits::*;
pub use toml::{parse_config, ParseError};
