//! Communication link health
//!
//! Compares each channel's last activity against its timeout. Only
//! safety-critical channels produce faults; a silent non-critical channel
//! is logged once per outage.

use heapless::Vec;

use crate::config::{ChannelConfig, MAX_CHANNELS};

use super::elapsed_ms;
use super::fault::{FaultCode, FaultKind};

#[derive(Debug, Clone, Copy, Default)]
struct ChannelHealth {
    timeout_ms: u32,
    safety_critical: bool,
    last_activity_ms: u32,
    timed_out: bool,
}

/// Per-channel activity tracker
#[derive(Debug, Clone)]
pub struct CommHealthTracker {
    channels: Vec<ChannelHealth, MAX_CHANNELS>,
}

impl CommHealthTracker {
    /// Build a tracker for the configured channels
    ///
    /// Every channel starts as if it had just been active at `now_ms`.
    pub fn new(config: &[ChannelConfig], now_ms: u32) -> Self {
        let channels = config
            .iter()
            .take(MAX_CHANNELS)
            .map(|c| ChannelHealth {
                timeout_ms: c.timeout_ms,
                safety_critical: c.safety_critical,
                last_activity_ms: now_ms,
                timed_out: false,
            })
            .collect();
        Self { channels }
    }

    /// Number of tracked channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channel is tracked
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Record a valid message on `channel`
    ///
    /// Re-reporting the same timestamp is not new activity and leaves a
    /// timeout in place.
    pub fn record_activity(&mut self, channel: u8, now_ms: u32) {
        if let Some(c) = self.channels.get_mut(channel as usize) {
            if c.last_activity_ms != now_ms {
                c.last_activity_ms = now_ms;
                if c.timed_out {
                    info!("Channel {} active again", channel);
                    c.timed_out = false;
                }
            }
        }
    }

    /// Last recorded activity on `channel`
    pub fn last_activity(&self, channel: u8) -> Option<u32> {
        self.channels
            .get(channel as usize)
            .map(|c| c.last_activity_ms)
    }

    /// Check one channel
    ///
    /// A timeout stays latched until new activity is recorded, however far
    /// the clock moves on.
    pub fn check(&mut self, channel: u8, now_ms: u32) -> Option<FaultCode> {
        let c = self.channels.get_mut(channel as usize)?;

        if !c.timed_out && elapsed_ms(now_ms, c.last_activity_ms) > c.timeout_ms {
            if c.safety_critical {
                warn!("Channel {} timed out", channel);
            } else {
                warn!("Non-critical channel {} silent, ignoring", channel);
            }
            c.timed_out = true;
        }

        if c.timed_out && c.safety_critical {
            Some(FaultCode::new(FaultKind::CommTimeout, channel, now_ms))
        } else {
            None
        }
    }

    /// Check every channel, returning the first critical timeout
    pub fn check_all(&mut self, now_ms: u32) -> Option<FaultCode> {
        let mut worst = None;
        for channel in 0..self.channels.len() as u8 {
            let fault = self.check(channel, now_ms);
            if worst.is_none() {
                worst = fault;
            }
        }
        worst
    }

    /// Whether `channel` is currently past its timeout
    pub fn is_timed_out(&self, channel: u8) -> bool {
        self.channels
            .get(channel as usize)
            .map(|c| c.timed_out)
            .unwrap_or(false)
    }
}
