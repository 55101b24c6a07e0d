//! Emergency-stop latch
//!
//! Set from interrupt context, drained by the supervisor at the start of
//! every tick. Neither side ever blocks.

use portable_atomic::{AtomicBool, Ordering};

/// Single-producer, single-consumer emergency-stop flag
#[derive(Debug)]
pub struct EmergencyStopLatch {
    pending: AtomicBool,
}

impl EmergencyStopLatch {
    /// Create an idle latch, usable in a `static`
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Request an emergency stop
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume a pending request
    ///
    /// Returns `true` once per trigger, however many triggers arrived since
    /// the last call.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Check for a pending request without consuming it
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for EmergencyStopLatch {
    fn default() -> Self {
        Self::new()
    }
}
