//! Safety configuration loading
//!
//! Parses the embedded safety.toml. A file that fails to parse or validate
//! falls back to the built-in defaults, which are always valid.

use defmt::*;

use twinstep_core::config::{parse_config, SafetyConfig};

/// Embedded safety configuration (compiled into firmware)
/// Edit safety.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../../safety.toml");

/// Load the safety configuration
pub fn load_safety_config() -> SafetyConfig {
    let config = match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to parse safety.toml: {:?}", e);
            error!("Using built-in safety defaults");
            return SafetyConfig::default();
        }
    };

    if let Err(e) = config.validate() {
        error!("safety.toml rejected: {:?}", e);
        error!("Using built-in safety defaults");
        return SafetyConfig::default();
    }

    log_config_summary(&config);
    config
}

/// Log a summary of the loaded configuration
fn log_config_summary(config: &SafetyConfig) {
    info!("Safety configuration loaded");
    debug!("  tick {} ms, watchdog {} ms", config.tick_interval_ms, config.watchdog_timeout_ms);
    for channel in config.channels.iter() {
        debug!(
            "  channel {}: {} ms, critical={}",
            channel.name.as_str(),
            channel.timeout_ms,
            channel.safety_critical
        );
    }
    debug!(
        "  recovery: {} attempts, window {} ms",
        config.recovery.max_attempts,
        config.recovery.recovery_window_ms()
    );
}
