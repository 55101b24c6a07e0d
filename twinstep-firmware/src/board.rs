//! RP2040 implementation of the supervisor's hardware boundary
//!
//! Sensor reads come from the snapshot the polling tasks keep up to date;
//! actuation and reset requests are queued for the task that owns the bus.
//! Nothing here blocks.

use defmt::*;
use embassy_rp::watchdog::Watchdog as HwWatchdog;

use twinstep_core::safety::{EncoderSample, FailSafeAction, MotorStatus};
use twinstep_core::traits::{
    MotorActuator, ResetController, ResetError, SensorSource, Subsystem, Watchdog,
};
use twinstep_core::{ENCODER_COUNT, MOTOR_COUNT};

use crate::channels::{
    SensorReadings, TmcCommand, ENCODER_RESET, HOST_RESET, SENSORS, TMC_COMMANDS,
};

/// Top of RAM; the main stack grows down from here
const STACK_TOP: u32 = 0x2004_0000;

/// Stack budget the headroom figure is measured against
const STACK_BUDGET: u32 = 16 * 1024;

/// Channel indices of the links this board knows how to reset
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelMap {
    pub host: Option<u8>,
    pub ui: Option<u8>,
    pub tmc: Option<u8>,
}

/// Lowest main stack pointer seen so far
struct StackWatermark {
    lowest: u32,
}

impl StackWatermark {
    fn new() -> Self {
        Self { lowest: STACK_TOP }
    }

    fn sample(&mut self) {
        let msp = cortex_m::register::msp::read();
        self.lowest = self.lowest.min(msp);
    }

    fn headroom_percent(&self) -> u8 {
        let used = STACK_TOP.saturating_sub(self.lowest);
        let free = STACK_BUDGET.saturating_sub(used);
        (free * 100 / STACK_BUDGET) as u8
    }
}

/// Hardware seen by the safety supervisor
pub struct Board {
    readings: SensorReadings,
    watchdog: HwWatchdog,
    stack: StackWatermark,
    cpu_load_percent: u8,
    channels: ChannelMap,
    restart_requested: bool,
}

impl Board {
    /// Create the board around a started hardware watchdog
    pub fn new(watchdog: HwWatchdog, channels: ChannelMap) -> Self {
        Self {
            readings: SensorReadings {
                motor_status: [MotorStatus::empty(); MOTOR_COUNT],
                encoder_samples: [None; ENCODER_COUNT],
                channel_activity: Default::default(),
            },
            watchdog,
            stack: StackWatermark::new(),
            cpu_load_percent: 0,
            channels,
            restart_requested: false,
        }
    }

    /// Copy out the latest readings before a tick
    pub fn refresh(&mut self, cpu_load_percent: u8) {
        self.readings = SENSORS.lock(|cell| cell.get());
        self.stack.sample();
        self.cpu_load_percent = cpu_load_percent;
    }

    /// Check and clear a pending restart request
    pub fn take_restart_request(&mut self) -> bool {
        core::mem::take(&mut self.restart_requested)
    }

    /// Reset the chip through the watchdog
    pub fn restart(&mut self) {
        warn!("Restarting");
        self.watchdog.trigger_reset();
    }

    fn send(&self, command: TmcCommand) {
        if TMC_COMMANDS.try_send(command).is_err() {
            error!("TMC command queue full, dropped {:?}", command);
        }
    }
}

impl SensorSource for Board {
    fn read_motor_status(&self, motor: u8) -> MotorStatus {
        self.readings
            .motor_status
            .get(motor as usize)
            .copied()
            .unwrap_or_default()
    }

    fn read_encoder_sample(&self, encoder: u8) -> Option<EncoderSample> {
        self.readings
            .encoder_samples
            .get(encoder as usize)
            .copied()
            .flatten()
    }

    fn channel_last_activity(&self, channel: u8) -> Option<u32> {
        self.readings
            .channel_activity
            .get(channel as usize)
            .copied()
            .flatten()
    }

    fn stack_headroom_percent(&self) -> u8 {
        self.stack.headroom_percent()
    }

    fn cpu_load_percent(&self) -> u8 {
        self.cpu_load_percent
    }
}

impl MotorActuator for Board {
    fn apply_motor_action(&mut self, motor: u8, action: FailSafeAction) {
        self.send(TmcCommand::Apply { motor, action });
    }

    fn release_motor(&mut self, motor: u8) {
        self.send(TmcCommand::Release { motor });
    }

    fn set_current_derate(&mut self, motor: u8, derate: bool) {
        self.send(TmcCommand::Derate { motor, on: derate });
    }
}

impl Watchdog for Board {
    fn service_watchdog(&mut self) {
        self.watchdog.feed();
    }
}

impl ResetController for Board {
    fn request_soft_reset(&mut self, subsystem: Subsystem) -> Result<(), ResetError> {
        match subsystem {
            Subsystem::Motor(motor) if (motor as usize) < MOTOR_COUNT => TMC_COMMANDS
                .try_send(TmcCommand::Reinit { motor })
                .map_err(|_| ResetError::Busy),
            Subsystem::Encoder(encoder) => {
                let signal = ENCODER_RESET
                    .get(encoder as usize)
                    .ok_or(ResetError::Unsupported)?;
                signal.signal(());
                Ok(())
            }
            Subsystem::Channel(channel) => {
                let ChannelMap { host, ui, tmc } = self.channels;
                if Some(channel) == host || Some(channel) == ui {
                    HOST_RESET.signal(());
                    Ok(())
                } else if Some(channel) == tmc {
                    for motor in 0..MOTOR_COUNT as u8 {
                        TMC_COMMANDS
                            .try_send(TmcCommand::Reinit { motor })
                            .map_err(|_| ResetError::Busy)?;
                    }
                    Ok(())
                } else {
                    Err(ResetError::Unsupported)
                }
            }
            Subsystem::Motor(_) => Err(ResetError::Unsupported),
        }
    }

    fn request_hard_reset(&mut self) -> Result<(), ResetError> {
        // Deferred so the stop commands reach the drivers first
        self.restart_requested = true;
        Ok(())
    }
}
