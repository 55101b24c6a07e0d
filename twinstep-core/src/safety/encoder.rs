//! Magnetic encoder validation
//!
//! Checks each position sample for staleness, implausible jumps and
//! magnetic field strength. The stored position is only replaced by a
//! sample that passes every check, so a stale or jumping encoder keeps
//! being reported until good data arrives or the encoder is re-initialized.

use crate::config::EncoderLimits;

use super::elapsed_ms;
use super::fault::{FaultCode, FaultKind};

/// Degrees in one revolution
const FULL_TURN_DEG: f32 = 360.0;

/// One position reading from an encoder
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderSample {
    /// Angular position in degrees (0-360, wrapping)
    pub position_deg: f32,
    /// Magnetic field magnitude in sensor units
    pub magnitude: u16,
    /// Time the sample was taken, in milliseconds
    pub timestamp_ms: u32,
}

/// Health bookkeeping for one encoder
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderHealth {
    /// Last position that passed validation
    pub last_position_deg: f32,
    /// Timestamp of the last valid sample
    pub last_update_ms: u32,
    /// Most recently read field magnitude
    pub magnitude: u16,
    /// Samples rejected since the last valid one
    pub consecutive_errors: u8,
    /// A reference position has been captured
    pub initialized: bool,
}

impl Default for EncoderHealth {
    fn default() -> Self {
        Self {
            last_position_deg: 0.0,
            last_update_ms: 0,
            magnitude: 0,
            consecutive_errors: 0,
            initialized: false,
        }
    }
}

/// Validator for one encoder's sample stream
#[derive(Debug, Clone)]
pub struct EncoderValidator {
    id: u8,
    health: EncoderHealth,
    last_result: Option<FaultCode>,
    /// No valid update within the timeout; cleared only by an accepted sample
    update_expired: bool,
    /// Timestamp of the sample last found stale
    stale_sample_ms: Option<u32>,
}

impl EncoderValidator {
    /// Create a validator for encoder `id`, starting its staleness clock at `now_ms`
    pub fn new(id: u8, now_ms: u32) -> Self {
        Self {
            id,
            health: EncoderHealth {
                last_update_ms: now_ms,
                ..EncoderHealth::default()
            },
            last_result: None,
            update_expired: false,
            stale_sample_ms: None,
        }
    }

    /// Encoder index
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Current health record
    pub fn health(&self) -> &EncoderHealth {
        &self.health
    }

    /// Result of the most recent validation
    pub fn last_result(&self) -> Option<FaultCode> {
        self.last_result
    }

    /// Forget the reference position (encoder re-initialized)
    ///
    /// The staleness clock keeps running from the last valid sample, so an
    /// encoder that stays silent after a reset is still reported.
    pub fn reset(&mut self) {
        self.health = EncoderHealth {
            last_update_ms: self.health.last_update_ms,
            ..EncoderHealth::default()
        };
        self.last_result = None;
    }

    /// Validate the latest sample
    ///
    /// `sample` is `None` when the encoder has never produced data; the
    /// staleness check then runs against the last valid update.
    pub fn validate(
        &mut self,
        sample: Option<&EncoderSample>,
        now_ms: u32,
        limits: &EncoderLimits,
    ) -> Option<FaultCode> {
        let result = match sample {
            Some(sample) => self.check_sample(sample, now_ms, limits),
            None => self
                .no_recent_update(now_ms, limits.timeout_ms)
                .then_some(FaultKind::EncoderTimeout),
        };

        let result = result.map(|kind| FaultCode::new(kind, self.id, now_ms));
        if result.is_some() {
            self.health.consecutive_errors = self.health.consecutive_errors.saturating_add(1);
        }
        self.last_result = result;
        result
    }

    fn check_sample(
        &mut self,
        sample: &EncoderSample,
        now_ms: u32,
        limits: &EncoderLimits,
    ) -> Option<FaultKind> {
        // (a) staleness: the newest data is too old
        if self.sample_stale(sample, now_ms, limits.timeout_ms) {
            return Some(FaultKind::EncoderTimeout);
        }
        let expired = self.no_recent_update(now_ms, limits.timeout_ms);

        // (b) jump, (c) field strength; a fresh sample that fails either
        // while no valid update arrived in time is still a timeout
        if let Some(kind) = self.check_plausible(sample, limits) {
            return Some(if expired { FaultKind::EncoderTimeout } else { kind });
        }

        self.health.last_position_deg = normalize_deg(sample.position_deg);
        self.health.last_update_ms = sample.timestamp_ms;
        self.health.consecutive_errors = 0;
        self.health.initialized = true;
        self.update_expired = false;
        None
    }

    fn check_plausible(&mut self, sample: &EncoderSample, limits: &EncoderLimits) -> Option<FaultKind> {
        // Both the raw and the wrapped delta must exceed the threshold
        if !sample.position_deg.is_finite() {
            return Some(FaultKind::EncoderJump);
        }
        let position = normalize_deg(sample.position_deg);
        if self.health.initialized
            && is_jump(
                self.health.last_position_deg,
                position,
                limits.jump_threshold_deg,
            )
        {
            return Some(FaultKind::EncoderJump);
        }

        self.health.magnitude = sample.magnitude;
        if sample.magnitude < limits.min_magnitude || sample.magnitude > limits.max_magnitude {
            return Some(FaultKind::EncoderFieldError);
        }
        None
    }

    /// Latched: stays set however far the clock moves on
    fn no_recent_update(&mut self, now_ms: u32, timeout_ms: u32) -> bool {
        if !self.update_expired && elapsed_ms(now_ms, self.health.last_update_ms) > timeout_ms {
            self.update_expired = true;
        }
        self.update_expired
    }

    /// A sample once found stale stays stale until one with a new timestamp arrives
    fn sample_stale(&mut self, sample: &EncoderSample, now_ms: u32, timeout_ms: u32) -> bool {
        if self.stale_sample_ms == Some(sample.timestamp_ms) {
            return true;
        }
        let stale = elapsed_ms(now_ms, sample.timestamp_ms) > timeout_ms;
        self.stale_sample_ms = stale.then_some(sample.timestamp_ms);
        stale
    }
}

/// Map any angle into [0, 360)
fn normalize_deg(deg: f32) -> f32 {
    let wrapped = libm::fmodf(deg, FULL_TURN_DEG);
    if wrapped < 0.0 {
        wrapped + FULL_TURN_DEG
    } else {
        wrapped
    }
}

/// True when neither the direct nor the wraparound path is plausible
fn is_jump(last_deg: f32, new_deg: f32, threshold_deg: f32) -> bool {
    let delta = libm::fabsf(new_deg - last_deg);
    delta > threshold_deg && (FULL_TURN_DEG - delta) > threshold_deg
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(position_deg: f32, timestamp_ms: u32) -> EncoderSample {
        EncoderSample {
            position_deg,
            magnitude: 2000,
            timestamp_ms,
        }
    }

    #[test]
    fn test_first_sample_becomes_reference() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        assert_eq!(validator.validate(Some(&sample(123.0, 10)), 10, &limits), None);
        assert!(validator.health().initialized);
        assert_eq!(validator.health().last_position_deg, 123.0);
        assert_eq!(validator.health().last_update_ms, 10);
    }

    #[test]
    fn test_wraparound_is_not_a_jump() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        validator.validate(Some(&sample(359.0, 0)), 0, &limits);
        assert_eq!(validator.validate(Some(&sample(1.0, 5)), 5, &limits), None);
        assert_eq!(validator.validate(Some(&sample(358.5, 10)), 10, &limits), None);
    }

    #[test]
    fn test_jump_detected_and_reference_kept() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(1, 0);

        validator.validate(Some(&sample(10.0, 0)), 0, &limits);
        let fault = validator.validate(Some(&sample(100.0, 5)), 5, &limits).unwrap();
        assert_eq!(fault.kind, FaultKind::EncoderJump);
        assert_eq!(fault.source, 1);
        assert_eq!(validator.health().last_position_deg, 10.0);
        assert_eq!(validator.health().consecutive_errors, 1);

        // Back near the reference: accepted again
        assert_eq!(validator.validate(Some(&sample(15.0, 10)), 10, &limits), None);
        assert_eq!(validator.health().consecutive_errors, 0);
    }

    #[test]
    fn test_stale_sample_does_not_overwrite_position() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        validator.validate(Some(&sample(90.0, 0)), 0, &limits);

        // Same sample re-read long after it was taken
        for now in [60, 70, 200] {
            let fault = validator.validate(Some(&sample(91.0, 0)), now, &limits);
            assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderTimeout));
        }
        assert_eq!(validator.health().last_position_deg, 90.0);
        assert_eq!(validator.health().last_update_ms, 0);
        assert_eq!(validator.health().consecutive_errors, 3);

        // Fresh data clears it
        assert_eq!(validator.validate(Some(&sample(92.0, 205)), 210, &limits), None);
    }

    #[test]
    fn test_missing_sample_times_out() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        assert_eq!(validator.validate(None, 50, &limits), None);
        let fault = validator.validate(None, 51, &limits).unwrap();
        assert_eq!(fault.kind, FaultKind::EncoderTimeout);
        assert_eq!(validator.last_result(), Some(fault));
    }

    #[test]
    fn test_field_error_records_magnitude() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        let weak = EncoderSample {
            position_deg: 45.0,
            magnitude: 100,
            timestamp_ms: 0,
        };
        let fault = validator.validate(Some(&weak), 0, &limits).unwrap();
        assert_eq!(fault.kind, FaultKind::EncoderFieldError);
        assert_eq!(validator.health().magnitude, 100);
        assert!(!validator.health().initialized);
    }

    #[test]
    fn test_timeout_checked_before_jump() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        validator.validate(Some(&sample(0.0, 0)), 0, &limits);
        let fault = validator.validate(Some(&sample(180.0, 0)), 500, &limits).unwrap();
        assert_eq!(fault.kind, FaultKind::EncoderTimeout);
    }

    #[test]
    fn test_reset_restarts_reference() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);

        validator.validate(Some(&sample(10.0, 0)), 0, &limits);
        validator.validate(Some(&sample(200.0, 5)), 5, &limits);
        validator.reset();
        assert!(!validator.health().initialized);
        assert_eq!(validator.health().last_update_ms, 0);
        assert_eq!(validator.last_result(), None);

        // New reference accepted without a jump
        assert_eq!(validator.validate(Some(&sample(200.0, 10)), 10, &limits), None);
    }

    #[test]
    fn test_jumping_encoder_turns_into_timeout() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 0);
        validator.validate(Some(&sample(10.0, 0)), 0, &limits);

        // Fresh data that never passes: a jump at first, then no valid
        // update for longer than the timeout
        let fault = validator.validate(Some(&sample(120.0, 25)), 25, &limits);
        assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderJump));
        let fault = validator.validate(Some(&sample(120.0, 55)), 55, &limits);
        assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderTimeout));

        let weak = EncoderSample {
            position_deg: 12.0,
            magnitude: 50,
            timestamp_ms: 80,
        };
        let fault = validator.validate(Some(&weak), 80, &limits);
        assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderTimeout));
        assert_eq!(validator.health().last_update_ms, 0);

        // A fresh plausible sample is accepted
        assert_eq!(validator.validate(Some(&sample(12.0, 90)), 90, &limits), None);
        assert_eq!(validator.health().last_update_ms, 90);
        assert_eq!(validator.validate(Some(&sample(13.0, 95)), 95, &limits), None);
    }

    #[test]
    fn test_staleness_reported_across_clock_range() {
        let limits = EncoderLimits::default();
        let half_range = 1u32 << 31;

        let mut validator = EncoderValidator::new(0, 0);
        validator.validate(Some(&sample(90.0, 0)), 0, &limits);
        for now in [1_000, half_range + 1_000, u32::MAX, 10] {
            let fault = validator.validate(Some(&sample(90.0, 0)), now, &limits);
            assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderTimeout), "now={now}");
        }

        let mut silent = EncoderValidator::new(1, 0);
        for now in [1_000, half_range + 1_000, u32::MAX, 10] {
            let fault = silent.validate(None, now, &limits);
            assert_eq!(fault.map(|f| f.kind), Some(FaultKind::EncoderTimeout), "now={now}");
        }
        silent.reset();
        assert!(silent.validate(None, 20, &limits).is_some());
    }

    #[test]
    fn test_clock_started_at_creation() {
        let limits = EncoderLimits::default();
        let mut validator = EncoderValidator::new(0, 5_000);
        assert_eq!(validator.validate(None, 5_040, &limits), None);
        assert!(validator.validate(None, 5_051, &limits).is_some());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_deg(360.0), 0.0);
        assert_eq!(normalize_deg(-90.0), 270.0);
        assert_eq!(normalize_deg(725.0), 5.0);
    }

    proptest! {
        #[test]
        fn prop_small_true_delta_never_jumps(start in 0.0f32..360.0, delta in -29.0f32..29.0) {
            let limits = EncoderLimits::default();
            let mut validator = EncoderValidator::new(0, 0);
            validator.validate(Some(&sample(start, 0)), 0, &limits);

            let next = normalize_deg(start + delta);
            let result = validator.validate(Some(&sample(next, 1)), 1, &limits);
            prop_assert_eq!(result, None);
        }
    }
}
