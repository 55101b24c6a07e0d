//! Trapezoidal velocity profile timing
//!
//! Acceleration and deceleration use the same magnitude. A move too short to
//! reach the velocity limit degenerates into a triangular profile with no
//! constant-velocity phase.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Velocity profile shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProfileShape {
    /// Accelerate, cruise at the velocity limit, decelerate
    Trapezoidal,
    /// Accelerate then immediately decelerate
    Triangular,
}

/// Phase of a move at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// Not started (or unknown handle)
    Idle,
    /// Ramping up
    Accelerating,
    /// Cruising at the velocity limit
    Constant,
    /// Ramping down
    Decelerating,
    /// Move finished
    Complete,
    /// Move cancelled by the supervisor
    Aborted,
}

impl Phase {
    /// Check if the motor is expected to be moving
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            Phase::Accelerating | Phase::Constant | Phase::Decelerating
        )
    }
}

/// Timing of one accepted move
///
/// Durations are in seconds, the start time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionTiming {
    /// Signed displacement in degrees
    pub target_deg: f32,
    /// Acceleration phase duration
    pub accel_s: f32,
    /// Constant-velocity phase duration
    pub constant_s: f32,
    /// Deceleration phase duration
    pub decel_s: f32,
    /// Sum of the three phases
    pub total_s: f32,
    /// Time the move started
    pub start_ms: u32,
    /// Profile shape
    pub shape: ProfileShape,
}

impl MotionTiming {
    /// Compute the profile for a move
    ///
    /// `v_max` and `accel` must be positive and finite; the caller checks
    /// this before calling.
    pub fn compute(target_deg: f32, v_max: f32, accel: f32, start_ms: u32) -> Self {
        let distance = libm::fabsf(target_deg);
        let t_a = v_max / accel;
        let d_a = 0.5 * accel * t_a * t_a;

        let (shape, accel_s, constant_s) = if 2.0 * d_a >= distance {
            (ProfileShape::Triangular, libm::sqrtf(distance / accel), 0.0)
        } else {
            let constant_distance = distance - 2.0 * d_a;
            (ProfileShape::Trapezoidal, t_a, constant_distance / v_max)
        };
        let decel_s = accel_s;

        Self {
            target_deg,
            accel_s,
            constant_s,
            decel_s,
            total_s: accel_s + constant_s + decel_s,
            start_ms,
            shape,
        }
    }

    /// Phase at `now_ms`
    pub fn phase_at(&self, now_ms: u32) -> Phase {
        let elapsed = now_ms.wrapping_sub(self.start_ms) as i32;
        if elapsed < 0 {
            return Phase::Idle;
        }
        let t = elapsed as f32 / 1000.0;

        if t >= self.total_s {
            Phase::Complete
        } else if t < self.accel_s {
            Phase::Accelerating
        } else if t < self.accel_s + self.constant_s {
            Phase::Constant
        } else {
            Phase::Decelerating
        }
    }

    /// Time at which the move completes
    pub fn end_ms(&self) -> u32 {
        self.start_ms
            .wrapping_add(libm::ceilf(self.total_s * 1000.0) as u32)
    }
}
