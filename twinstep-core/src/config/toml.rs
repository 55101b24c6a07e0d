//! Simple TOML parser for the safety configuration
//!
//! This is a minimal TOML parser that handles only the subset needed for
//! `safety.toml`. It does NOT support the full TOML spec and needs no
//! allocator.
//!
//! Supported features:
//! - Key = value pairs (string, integer, float, boolean)
//! - [section] headers
//! - [section.name] and [section name] headers
//! - Comments (# ...)
//!
//! NOT supported:
//! - Arrays and inline tables
//! - Multi-line strings
//! - Dotted keys outside section headers

use heapless::String as HString;

use super::limits::{ChannelConfig, SafetyConfig, MAX_LABEL_LEN};

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid or unknown section header
    InvalidSection,
    /// Invalid value type
    InvalidValue,
    /// Too many items (exceeded heapless capacity)
    TooManyItems,
    /// Two channel sections share a name
    DuplicateChannel,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Supervisor,
    Encoder,
    Resources,
    Recovery,
    Motion,
    Channel,
}

/// Parse TOML configuration into a SafetyConfig
///
/// Keys absent from the input keep their default values. Channels are only
/// those declared in the input.
pub fn parse_config(input: &str) -> Result<SafetyConfig, ParseError> {
    let mut config = SafetyConfig::new();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = open_section(&line[1..line.len() - 1], &mut config)?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    Ok(config)
}

/// Parse a section header and create any per-section storage
fn open_section(header: &str, config: &mut SafetyConfig) -> Result<Section, ParseError> {
    let header = header.trim();

    let (kind, name) = match header.split_once('.') {
        Some((kind, name)) => (kind.trim(), Some(name.trim())),
        None => {
            let mut parts = header.split_whitespace();
            let kind = parts.next().ok_or(ParseError::InvalidSection)?;
            (kind, parts.next())
        }
    };

    match (kind, name) {
        ("supervisor", None) => Ok(Section::Supervisor),
        ("encoder", None) => Ok(Section::Encoder),
        ("resources", None) => Ok(Section::Resources),
        ("recovery", None) => Ok(Section::Recovery),
        ("motion", None) => Ok(Section::Motion),
        ("channel", Some(name)) => {
            if name.is_empty() || name.contains('.') {
                return Err(ParseError::InvalidSection);
            }
            let name: HString<MAX_LABEL_LEN> =
                HString::try_from(name).map_err(|_| ParseError::InvalidSection)?;
            if config.find_channel(name.as_str()).is_some() {
                return Err(ParseError::DuplicateChannel);
            }
            let channel = ChannelConfig {
                name,
                timeout_ms: 1000,
                safety_critical: true,
            };
            config
                .channels
                .push(channel)
                .map_err(|_| ParseError::TooManyItems)?;
            Ok(Section::Channel)
        }
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments
    let value = if let Some(hash_pos) = value.find('#') {
        // Make sure # is not inside a string
        let quote_count = value[..hash_pos].matches('"').count();
        if quote_count % 2 == 0 {
            value[..hash_pos].trim()
        } else {
            value
        }
    } else {
        value
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse an integer value, allowing `_` digit separators
fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    let mut digits: HString<24> = HString::new();
    for c in value.chars().filter(|c| *c != '_') {
        digits.push(c).map_err(|_| ParseError::InvalidValue)?;
    }
    digits.parse().map_err(|_| ParseError::InvalidValue)
}

/// Parse a float value
fn parse_float(value: &str) -> Result<f32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

/// Parse a boolean value
fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut SafetyConfig,
) -> Result<(), ParseError> {
    match section {
        Section::Root | Section::Supervisor => match key {
            "version" => config.version = parse_int(value)?,
            "tick_interval_ms" => config.tick_interval_ms = parse_int(value)?,
            "watchdog_timeout_ms" => config.watchdog_timeout_ms = parse_int(value)?,
            _ => {} // Ignore unknown keys
        },
        Section::Encoder => {
            let e = &mut config.encoder;
            match key {
                "timeout_ms" => e.timeout_ms = parse_int(value)?,
                "jump_threshold_deg" => e.jump_threshold_deg = parse_float(value)?,
                "min_magnitude" => e.min_magnitude = parse_int(value)?,
                "max_magnitude" => e.max_magnitude = parse_int(value)?,
                _ => {}
            }
        }
        Section::Resources => {
            let r = &mut config.resources;
            match key {
                "stack_warn_percent" => r.stack_warn_percent = parse_int(value)?,
                "stack_fault_percent" => r.stack_fault_percent = parse_int(value)?,
                "cpu_warn_percent" => r.cpu_warn_percent = parse_int(value)?,
                "cpu_fault_percent" => r.cpu_fault_percent = parse_int(value)?,
                _ => {}
            }
        }
        Section::Recovery => {
            let r = &mut config.recovery;
            match key {
                "base_backoff_ms" => r.base_backoff_ms = parse_int(value)?,
                "max_backoff_ms" => r.max_backoff_ms = parse_int(value)?,
                "max_attempts" => r.max_attempts = parse_int(value)?,
                _ => {}
            }
        }
        Section::Motion => {
            let m = &mut config.motion;
            match key {
                "max_velocity_dps" => m.max_velocity_dps = parse_float(value)?,
                "max_accel_dps2" => m.max_accel_dps2 = parse_float(value)?,
                _ => {}
            }
        }
        Section::Channel => {
            let c = config
                .channels
                .last_mut()
                .ok_or(ParseError::InvalidSection)?;
            match key {
                "timeout_ms" => c.timeout_ms = parse_int(value)?,
                "safety_critical" => c.safety_critical = parse_bool(value)?,
                _ => {}
            }
        }
    }

    Ok(())
}
