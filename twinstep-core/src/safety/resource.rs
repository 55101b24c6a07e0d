//! System resource headroom
//!
//! Low stack headroom or high CPU load is logged as a warning first and only
//! becomes a fault past the hard threshold.

use crate::config::ResourceLimits;

use super::fault::{FaultCode, FaultKind};

/// Fault source index for stack exhaustion
pub const SOURCE_STACK: u8 = 0;

/// Fault source index for CPU overload
pub const SOURCE_CPU: u8 = 1;

/// Resource usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResourceSnapshot {
    /// Unused stack as a percentage of the stack region
    pub stack_headroom_percent: u8,
    /// Busy time as a percentage of the measurement window
    pub cpu_load_percent: u8,
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            stack_headroom_percent: 100,
            cpu_load_percent: 0,
        }
    }
}

/// Resource threshold checker
#[derive(Debug, Clone, Default)]
pub struct ResourceMonitor {
    stack_warned: bool,
    cpu_warned: bool,
}

impl ResourceMonitor {
    /// Create a new resource monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a snapshot; stack exhaustion is reported before CPU overload
    pub fn check(
        &mut self,
        snapshot: &ResourceSnapshot,
        limits: &ResourceLimits,
        now_ms: u32,
    ) -> Option<FaultCode> {
        let stack_low = snapshot.stack_headroom_percent < limits.stack_warn_percent;
        if stack_low && !self.stack_warned {
            warn!(
                "Stack headroom low: {}%",
                snapshot.stack_headroom_percent
            );
        }
        self.stack_warned = stack_low;

        let cpu_high = snapshot.cpu_load_percent > limits.cpu_warn_percent;
        if cpu_high && !self.cpu_warned {
            warn!("CPU load high: {}%", snapshot.cpu_load_percent);
        }
        self.cpu_warned = cpu_high;

        if snapshot.stack_headroom_percent < limits.stack_fault_percent {
            return Some(FaultCode::new(
                FaultKind::ResourceExhaustion,
                SOURCE_STACK,
                now_ms,
            ));
        }
        if snapshot.cpu_load_percent > limits.cpu_fault_percent {
            return Some(FaultCode::new(
                FaultKind::ResourceExhaustion,
                SOURCE_CPU,
                now_ms,
            ));
        }
        None
    }

    /// Whether a warning-level condition is currently active
    pub fn is_warning(&self) -> bool {
        self.stack_warned || self.cpu_warned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(stack: u8, cpu: u8) -> ResourceSnapshot {
        ResourceSnapshot {
            stack_headroom_percent: stack,
            cpu_load_percent: cpu,
        }
    }

    #[test]
    fn test_healthy() {
        let mut monitor = ResourceMonitor::new();
        let limits = ResourceLimits::default();
        assert_eq!(monitor.check(&snapshot(60, 40), &limits, 0), None);
        assert!(!monitor.is_warning());
    }

    #[test]
    fn test_warning_below_hard_threshold() {
        let mut monitor = ResourceMonitor::new();
        let limits = ResourceLimits::default();
        assert_eq!(monitor.check(&snapshot(20, 40), &limits, 0), None);
        assert!(monitor.is_warning());
        assert_eq!(monitor.check(&snapshot(60, 90), &limits, 0), None);
        assert!(monitor.is_warning());
    }

    #[test]
    fn test_stack_exhaustion_faults() {
        let mut monitor = ResourceMonitor::new();
        let limits = ResourceLimits::default();
        let fault = monitor.check(&snapshot(5, 99), &limits, 7).unwrap();
        assert_eq!(fault.kind, FaultKind::ResourceExhaustion);
        assert_eq!(fault.source, SOURCE_STACK);
        assert_eq!(fault.timestamp_ms, 7);
    }

    #[test]
    fn test_cpu_overload_faults() {
        let mut monitor = ResourceMonitor::new();
        let limits = ResourceLimits::default();
        let fault = monitor.check(&snapshot(50, 98), &limits, 0).unwrap();
        assert_eq!(fault.source, SOURCE_CPU);
    }
}
