//! Safety configuration types
//!
//! Thresholds, timeouts and limits consumed by the safety supervisor and the
//! motion profile engine. All values have conservative defaults so a board
//! with no configuration still comes up in a safe, working state.

use heapless::{String, Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration format version understood by this firmware
pub const CONFIG_VERSION: u8 = 1;

/// Maximum label length
pub const MAX_LABEL_LEN: usize = 16;

/// Maximum monitored communication channels
pub const MAX_CHANNELS: usize = 4;

/// Encoder validation limits
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncoderLimits {
    /// Maximum age of the latest sample before it is considered stale
    pub timeout_ms: u32,
    /// Largest plausible angular change between consecutive samples
    pub jump_threshold_deg: f32,
    /// Lowest acceptable magnetic field magnitude (sensor units)
    pub min_magnitude: u16,
    /// Highest acceptable magnetic field magnitude (sensor units)
    pub max_magnitude: u16,
}

impl Default for EncoderLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 50,
            jump_threshold_deg: 30.0,
            min_magnitude: 400,
            max_magnitude: 3600,
        }
    }
}

/// Communication channel monitoring configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelConfig {
    /// Channel name (e.g., "host", "ui")
    pub name: String<MAX_LABEL_LEN>,
    /// Maximum silence before the channel is considered lost
    pub timeout_ms: u32,
    /// Whether a timeout on this channel is a fault
    pub safety_critical: bool,
}

impl ChannelConfig {
    /// Create a channel config, truncating over-long names
    pub fn new(name: &str, timeout_ms: u32, safety_critical: bool) -> Self {
        let mut label = String::new();
        for c in name.chars() {
            if label.push(c).is_err() {
                break;
            }
        }
        Self {
            name: label,
            timeout_ms,
            safety_critical,
        }
    }
}

/// System resource thresholds
///
/// Stack headroom is "lower is worse", CPU load is "higher is worse".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceLimits {
    /// Warn when stack headroom drops below this percentage
    pub stack_warn_percent: u8,
    /// Fault when stack headroom drops below this percentage
    pub stack_fault_percent: u8,
    /// Warn when CPU load rises above this percentage
    pub cpu_warn_percent: u8,
    /// Fault when CPU load rises above this percentage
    pub cpu_fault_percent: u8,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            stack_warn_percent: 25,
            stack_fault_percent: 10,
            cpu_warn_percent: 85,
            cpu_fault_percent: 97,
        }
    }
}

/// Automatic recovery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecoveryConfig {
    /// Backoff before the second attempt is `base * 2`, third `base * 4`, ...
    pub base_backoff_ms: u32,
    /// Upper bound on any single backoff
    pub max_backoff_ms: u32,
    /// Attempts per category before manual intervention is required
    pub max_attempts: u8,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 100,
            max_backoff_ms: 10_000,
            max_attempts: 3,
        }
    }
}

impl RecoveryConfig {
    /// Backoff delay for a category that has already made `attempt` attempts
    ///
    /// Equals `base * 2^attempt`. The exponent is capped at `max_attempts`
    /// and the result at `max_backoff_ms`, so this never overflows.
    pub fn backoff_ms(&self, attempt: u8) -> u32 {
        let exponent = u32::from(attempt.min(self.max_attempts)).min(31);
        self.base_backoff_ms
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff_ms)
    }

    /// Longest time a fault episode can spend in automatic recovery
    ///
    /// The first attempt is immediate; every later attempt, and the final
    /// escalation, waits out the backoff for the attempts made so far. The
    /// supervisor escalates any episode that lasts this long, however many
    /// categories faulted during it.
    pub fn recovery_window_ms(&self) -> u32 {
        (1..=self.max_attempts).fold(0u32, |acc, n| acc.saturating_add(self.backoff_ms(n)))
    }
}

/// Hardware motion limits
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionLimits {
    /// Maximum commanded velocity in degrees per second
    pub max_velocity_dps: f32,
    /// Maximum commanded acceleration in degrees per second squared
    pub max_accel_dps2: f32,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            max_velocity_dps: 720.0,
            max_accel_dps2: 3600.0,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Configuration was written for a different firmware version
    UnsupportedVersion,
    /// Supervisor tick interval is zero
    InvalidTickInterval,
    /// A timeout is zero
    ZeroTimeout,
    /// Jump threshold is not a positive finite angle
    InvalidJumpThreshold,
    /// Magnitude band is empty or inverted
    InvalidMagnitudeBand,
    /// Warning thresholds are not less severe than fault thresholds
    InvalidResourceThresholds,
    /// Recovery is configured with zero attempts
    NoRecoveryAttempts,
    /// Motion limits are not positive finite values
    InvalidMotionLimits,
    /// The watchdog could expire during a bounded recovery sequence
    RecoveryWindowExceedsWatchdog,
}

/// Complete safety configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SafetyConfig {
    /// Configuration version for compatibility checks
    pub version: u8,
    /// Supervisor tick period
    pub tick_interval_ms: u32,
    /// Hardware watchdog timeout
    pub watchdog_timeout_ms: u32,
    /// Encoder validation limits (shared by all encoders)
    pub encoder: EncoderLimits,
    /// Monitored communication channels, indexed by channel id
    pub channels: Vec<ChannelConfig, MAX_CHANNELS>,
    /// Resource thresholds
    pub resources: ResourceLimits,
    /// Recovery settings
    pub recovery: RecoveryConfig,
    /// Motion limits
    pub motion: MotionLimits,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        let mut channels = Vec::new();
        let _ = channels.push(ChannelConfig::new("host", 500, true));
        let _ = channels.push(ChannelConfig::new("ui", 2000, false));

        Self {
            version: CONFIG_VERSION,
            tick_interval_ms: 5,
            watchdog_timeout_ms: 2000,
            encoder: EncoderLimits::default(),
            channels,
            resources: ResourceLimits::default(),
            recovery: RecoveryConfig::default(),
            motion: MotionLimits::default(),
        }
    }
}

impl SafetyConfig {
    /// Create a configuration with default values and no channels
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            ..Self::default()
        }
    }

    /// Find a channel id by name
    pub fn find_channel(&self, name: &str) -> Option<u8> {
        self.channels
            .iter()
            .position(|c| c.name.as_str() == name)
            .map(|i| i as u8)
    }

    /// Check the configuration for values the supervisor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.watchdog_timeout_ms == 0
            || self.encoder.timeout_ms == 0
            || self.channels.iter().any(|c| c.timeout_ms == 0)
        {
            return Err(ConfigError::ZeroTimeout);
        }

        let jump = self.encoder.jump_threshold_deg;
        if !jump.is_finite() || jump <= 0.0 || jump >= 360.0 {
            return Err(ConfigError::InvalidJumpThreshold);
        }
        if self.encoder.min_magnitude >= self.encoder.max_magnitude {
            return Err(ConfigError::InvalidMagnitudeBand);
        }

        let r = &self.resources;
        if r.stack_warn_percent <= r.stack_fault_percent
            || r.cpu_warn_percent >= r.cpu_fault_percent
            || r.cpu_fault_percent > 100
            || r.stack_warn_percent > 100
        {
            return Err(ConfigError::InvalidResourceThresholds);
        }

        if self.recovery.max_attempts == 0 {
            return Err(ConfigError::NoRecoveryAttempts);
        }

        let m = &self.motion;
        if !(m.max_velocity_dps.is_finite() && m.max_velocity_dps > 0.0)
            || !(m.max_accel_dps2.is_finite() && m.max_accel_dps2 > 0.0)
        {
            return Err(ConfigError::InvalidMotionLimits);
        }

        // Onset and escalation ticks may each go unfed
        let unfed_ms = self
            .recovery
            .recovery_window_ms()
            .saturating_add(self.tick_interval_ms.saturating_mul(2));
        if unfed_ms >= self.watchdog_timeout_ms {
            return Err(ConfigError::RecoveryWindowExceedsWatchdog);
        }

        Ok(())
    }
}
