//! In-flight move tracking
//!
//! One move slot per motor. Handles carry a generation number so a handle
//! to a replaced move can no longer observe or cancel its successor.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::MotionLimits;
use crate::MOTOR_COUNT;

use super::profile::{MotionTiming, Phase};

/// Reference to an accepted move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionHandle {
    /// Motor the move runs on
    pub motor: u8,
    /// Slot generation when the move was accepted
    pub generation: u16,
}

/// Why a move request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RejectReason {
    /// No such motor
    InvalidMotor,
    /// Target, velocity or acceleration is not a usable number
    InvalidParameters,
    /// Requested velocity exceeds the configured limit
    VelocityLimit,
    /// Requested acceleration exceeds the configured limit
    AccelerationLimit,
    /// Supervisor is not in a state that allows motion
    NotReady,
    /// The motor is still executing another move
    Busy,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    generation: u16,
    timing: Option<MotionTiming>,
    aborted: bool,
}

impl Slot {
    fn phase(&self, now_ms: u32) -> Phase {
        match self.timing {
            None => Phase::Idle,
            Some(_) if self.aborted => Phase::Aborted,
            Some(timing) => timing.phase_at(now_ms),
        }
    }
}

/// Move slots for every motor
#[derive(Debug, Clone, Default)]
pub struct MotionProfileEngine {
    slots: [Slot; MOTOR_COUNT],
}

impl MotionProfileEngine {
    /// Create an engine with every slot idle
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and accept a move
    pub fn submit(
        &mut self,
        motor: u8,
        target_deg: f32,
        v_max: f32,
        accel: f32,
        limits: &MotionLimits,
        now_ms: u32,
    ) -> Result<MotionHandle, RejectReason> {
        let slot = self
            .slots
            .get_mut(motor as usize)
            .ok_or(RejectReason::InvalidMotor)?;

        check_parameters(target_deg, v_max, accel, limits)?;

        if slot.phase(now_ms).is_moving() {
            return Err(RejectReason::Busy);
        }

        slot.generation = slot.generation.wrapping_add(1);
        slot.timing = Some(MotionTiming::compute(target_deg, v_max, accel, now_ms));
        slot.aborted = false;

        Ok(MotionHandle {
            motor,
            generation: slot.generation,
        })
    }

    /// Phase of a move; stale or unknown handles report `Idle`
    pub fn phase(&self, handle: MotionHandle, now_ms: u32) -> Phase {
        match self.slot(handle) {
            Some(slot) => slot.phase(now_ms),
            None => Phase::Idle,
        }
    }

    /// Timing of a move
    pub fn timing(&self, handle: MotionHandle) -> Option<&MotionTiming> {
        self.slot(handle).and_then(|slot| slot.timing.as_ref())
    }

    /// Abort one move
    pub fn abort(&mut self, handle: MotionHandle, now_ms: u32) {
        if let Some(slot) = self
            .slots
            .get_mut(handle.motor as usize)
            .filter(|slot| slot.generation == handle.generation)
        {
            abort_slot(slot, now_ms);
        }
    }

    /// Abort every move that has not completed
    ///
    /// Returns the number of moves that were actually cancelled.
    pub fn abort_all(&mut self, now_ms: u32) -> usize {
        let mut cancelled = 0;
        for slot in self.slots.iter_mut() {
            if abort_slot(slot, now_ms) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Check if `motor` is expected to be moving
    pub fn is_moving(&self, motor: u8, now_ms: u32) -> bool {
        self.slots
            .get(motor as usize)
            .map(|slot| slot.phase(now_ms).is_moving())
            .unwrap_or(false)
    }

    fn slot(&self, handle: MotionHandle) -> Option<&Slot> {
        self.slots
            .get(handle.motor as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}

fn abort_slot(slot: &mut Slot, now_ms: u32) -> bool {
    match slot.phase(now_ms) {
        Phase::Idle | Phase::Accelerating | Phase::Constant | Phase::Decelerating
            if slot.timing.is_some() =>
        {
            slot.aborted = true;
            true
        }
        _ => false,
    }
}

fn check_parameters(
    target_deg: f32,
    v_max: f32,
    accel: f32,
    limits: &MotionLimits,
) -> Result<(), RejectReason> {
    let usable = target_deg.is_finite()
        && v_max.is_finite()
        && accel.is_finite()
        && v_max > 0.0
        && accel > 0.0;
    if !usable {
        return Err(RejectReason::InvalidParameters);
    }
    if v_max > limits.max_velocity_dps {
        return Err(RejectReason::VelocityLimit);
    }
    if accel > limits.max_accel_dps2 {
        return Err(RejectReason::AccelerationLimit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(engine: &mut MotionProfileEngine, motor: u8, now_ms: u32) -> Result<MotionHandle, RejectReason> {
        engine.submit(motor, 400.0, 100.0, 50.0, &MotionLimits::default(), now_ms)
    }

    #[test]
    fn test_accept_and_track() {
        let mut engine = MotionProfileEngine::new();
        let handle = submit(&mut engine, 0, 0).unwrap();

        assert_eq!(handle.motor, 0);
        assert_eq!(engine.phase(handle, 1000), Phase::Accelerating);
        assert_eq!(engine.phase(handle, 3000), Phase::Constant);
        assert_eq!(engine.phase(handle, 6000), Phase::Complete);
        assert!(engine.is_moving(0, 1000));
        assert!(!engine.is_moving(1, 1000));
        assert_eq!(engine.timing(handle).map(|t| t.total_s), Some(6.0));
    }

    #[test]
    fn test_rejections() {
        let mut engine = MotionProfileEngine::new();
        let limits = MotionLimits::default();

        assert_eq!(
            engine.submit(5, 10.0, 10.0, 10.0, &limits, 0),
            Err(RejectReason::InvalidMotor)
        );
        assert_eq!(
            engine.submit(0, f32::NAN, 10.0, 10.0, &limits, 0),
            Err(RejectReason::InvalidParameters)
        );
        assert_eq!(
            engine.submit(0, 10.0, 0.0, 10.0, &limits, 0),
            Err(RejectReason::InvalidParameters)
        );
        assert_eq!(
            engine.submit(0, 10.0, limits.max_velocity_dps + 1.0, 10.0, &limits, 0),
            Err(RejectReason::VelocityLimit)
        );
        assert_eq!(
            engine.submit(0, 10.0, 10.0, limits.max_accel_dps2 * 2.0, &limits, 0),
            Err(RejectReason::AccelerationLimit)
        );
    }

    #[test]
    fn test_busy_until_complete() {
        let mut engine = MotionProfileEngine::new();
        submit(&mut engine, 0, 0).unwrap();

        assert_eq!(submit(&mut engine, 0, 100), Err(RejectReason::Busy));
        assert!(submit(&mut engine, 1, 100).is_ok());
        assert!(submit(&mut engine, 0, 6000).is_ok());
    }

    #[test]
    fn test_stale_handle_reports_idle() {
        let mut engine = MotionProfileEngine::new();
        let first = submit(&mut engine, 0, 0).unwrap();
        let second = submit(&mut engine, 0, 6000).unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.phase(first, 7000), Phase::Idle);
        assert_eq!(engine.phase(second, 7000), Phase::Accelerating);

        // Stale handle cannot cancel its successor
        engine.abort(first, 7000);
        assert_eq!(engine.phase(second, 7000), Phase::Accelerating);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut engine = MotionProfileEngine::new();
        let handle = submit(&mut engine, 0, 0).unwrap();

        assert_eq!(engine.abort_all(1000), 1);
        assert_eq!(engine.abort_all(1000), 0);
        engine.abort(handle, 1200);

        assert_eq!(engine.phase(handle, 1500), Phase::Aborted);
        assert!(!engine.is_moving(0, 1500));

        // Aborted slot accepts a new move
        assert!(submit(&mut engine, 0, 1500).is_ok());
    }

    #[test]
    fn test_abort_leaves_completed_moves_alone() {
        let mut engine = MotionProfileEngine::new();
        let handle = submit(&mut engine, 0, 0).unwrap();

        assert_eq!(engine.abort_all(10_000), 0);
        assert_eq!(engine.phase(handle, 10_000), Phase::Complete);
    }
}
