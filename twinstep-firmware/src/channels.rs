//! Inter-task communication
//!
//! Polling tasks publish their latest readings into critical-section cells;
//! the supervisor copies them out at the start of each tick. Commands that
//! must not be lost travel through bounded channels instead.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Instant;

use twinstep_core::config::MAX_CHANNELS;
use twinstep_core::safety::{
    EmergencyStopLatch, EncoderSample, FailSafeAction, MotorStatus, SystemSafetyState,
};
use twinstep_core::{ENCODER_COUNT, MOTOR_COUNT};

/// Channel capacity for driver commands
const TMC_CHANNEL_SIZE: usize = 16;

/// Channel capacity for operator commands
const OPERATOR_CHANNEL_SIZE: usize = 4;

/// Milliseconds since boot, wrapping
pub fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

/// Latest peripheral readings
#[derive(Clone, Copy)]
pub struct SensorReadings {
    pub motor_status: [MotorStatus; MOTOR_COUNT],
    pub encoder_samples: [Option<EncoderSample>; ENCODER_COUNT],
    pub channel_activity: [Option<u32>; MAX_CHANNELS],
}

impl SensorReadings {
    const fn new() -> Self {
        Self {
            motor_status: [MotorStatus::empty(); MOTOR_COUNT],
            encoder_samples: [None; ENCODER_COUNT],
            channel_activity: [None; MAX_CHANNELS],
        }
    }
}

/// Latest readings, written by the polling tasks
pub static SENSORS: Mutex<CriticalSectionRawMutex, Cell<SensorReadings>> =
    Mutex::new(Cell::new(SensorReadings::new()));

/// Safety snapshot, published by the supervisor every tick
pub static SAFETY_STATE: Mutex<CriticalSectionRawMutex, Cell<SystemSafetyState>> =
    Mutex::new(Cell::new(SystemSafetyState {
        supervisor_state: twinstep_core::state::SupervisorState::Normal,
        emergency_stop_active: false,
        recovery_required: false,
        active_fault: None,
        last_stop_reason: None,
        last_stop_ms: None,
        last_emergency_ms: None,
        restart_scheduled: false,
        derated: [false; MOTOR_COUNT],
    }));

/// Emergency stop latch, set from the E-stop input task
pub static ESTOP: EmergencyStopLatch = EmergencyStopLatch::new();

/// Commands for the TMC2209 task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TmcCommand {
    /// Put one driver into a fail-safe state
    Apply { motor: u8, action: FailSafeAction },
    /// Return one driver to normal operation
    Release { motor: u8 },
    /// Switch the derated run current on or off
    Derate { motor: u8, on: bool },
    /// Re-send the initialization sequence
    Reinit { motor: u8 },
}

pub static TMC_COMMANDS: Channel<CriticalSectionRawMutex, TmcCommand, TMC_CHANNEL_SIZE> =
    Channel::new();

/// Operator commands received over the host link
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorCommand {
    /// Leave the emergency stop
    Acknowledge,
    /// Clear a manual-intervention condition
    Clear,
    /// Start a move
    Move {
        motor: u8,
        target_deg: f32,
        v_max: f32,
        accel: f32,
    },
}

pub static OPERATOR_COMMANDS: Channel<
    CriticalSectionRawMutex,
    OperatorCommand,
    OPERATOR_CHANNEL_SIZE,
> = Channel::new();

/// Encoder re-initialization requests, one per encoder
pub static ENCODER_RESET: [Signal<CriticalSectionRawMutex, ()>; ENCODER_COUNT] =
    [Signal::new(), Signal::new()];

/// Host link re-initialization request
pub static HOST_RESET: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Replace one motor's status
pub fn publish_motor_status(motor: u8, status: MotorStatus) {
    SENSORS.lock(|cell| {
        let mut readings = cell.get();
        if let Some(slot) = readings.motor_status.get_mut(motor as usize) {
            *slot = status;
        }
        cell.set(readings);
    });
}

/// Replace one encoder's latest sample
pub fn publish_encoder_sample(encoder: u8, sample: Option<EncoderSample>) {
    SENSORS.lock(|cell| {
        let mut readings = cell.get();
        if let Some(slot) = readings.encoder_samples.get_mut(encoder as usize) {
            *slot = sample;
        }
        cell.set(readings);
    });
}

/// Record a valid message on a communication channel
pub fn record_channel_activity(channel: u8, timestamp_ms: u32) {
    SENSORS.lock(|cell| {
        let mut readings = cell.get();
        if let Some(slot) = readings.channel_activity.get_mut(channel as usize) {
            *slot = Some(timestamp_ms);
        }
        cell.set(readings);
    });
}
