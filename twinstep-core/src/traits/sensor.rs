//! Pre-fetched sensor snapshots

use crate::safety::{EncoderSample, MotorStatus, ResourceSnapshot};

/// Source of the latest peripheral readings
///
/// Implementations return whatever was last fetched by the polling tasks.
/// Nothing here may touch a bus.
pub trait SensorSource {
    /// Latest driver status for `motor`
    fn read_motor_status(&self, motor: u8) -> MotorStatus;

    /// Latest sample from `encoder`, or `None` if it never produced one
    fn read_encoder_sample(&self, encoder: u8) -> Option<EncoderSample>;

    /// Time of the last valid message on `channel`
    fn channel_last_activity(&self, channel: u8) -> Option<u32>;

    /// Unused stack as a percentage of the stack region
    fn stack_headroom_percent(&self) -> u8;

    /// Busy time as a percentage of the last measurement window
    fn cpu_load_percent(&self) -> u8 {
        0
    }

    /// Both resource figures at once
    fn resource_snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            stack_headroom_percent: self.stack_headroom_percent(),
            cpu_load_percent: self.cpu_load_percent(),
        }
    }
}
