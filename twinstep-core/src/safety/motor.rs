//! Motor driver status decoding
//!
//! Turns a driver status snapshot into at most one fault, highest severity
//! first. A thermal pre-warning is not a fault: it requests a drive current
//! derate instead.

use bitflags::bitflags;

use super::fault::{FaultCode, FaultKind};

bitflags! {
    /// Driver status snapshot, board-independent
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MotorStatus: u16 {
        /// Short to ground or supply on a bridge
        const OVERCURRENT = 1 << 0;
        /// Over-temperature shutdown
        const THERMAL_SHUTDOWN = 1 << 1;
        /// Supply or charge pump undervoltage
        const UNDERVOLTAGE = 1 << 2;
        /// Open load / lost steps on phase A
        const STEP_LOSS_A = 1 << 3;
        /// Open load / lost steps on phase B
        const STEP_LOSS_B = 1 << 4;
        /// Over-temperature pre-warning
        const THERMAL_WARNING = 1 << 5;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MotorStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "MotorStatus({=u16:#x})", self.bits())
    }
}

/// Checks in precedence order; the first match wins
const PRECEDENCE: [(MotorStatus, FaultKind); 4] = [
    (MotorStatus::OVERCURRENT, FaultKind::MotorOvercurrent),
    (MotorStatus::THERMAL_SHUTDOWN, FaultKind::MotorThermalShutdown),
    (MotorStatus::UNDERVOLTAGE, FaultKind::MotorUndervoltage),
    (
        MotorStatus::STEP_LOSS_A.union(MotorStatus::STEP_LOSS_B),
        FaultKind::MotorStepLoss,
    ),
];

/// Result of decoding one status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorDecode {
    /// Highest-precedence fault, if any
    pub fault: Option<FaultCode>,
    /// Derate edge: `Some(true)` to start derating, `Some(false)` to stop
    pub derate_change: Option<bool>,
}

/// Classify a status snapshot without side effects
pub fn classify(status: MotorStatus) -> Option<FaultKind> {
    PRECEDENCE
        .iter()
        .find(|(bits, _)| status.intersects(*bits))
        .map(|(_, kind)| *kind)
}

/// Decoder for one motor driver
#[derive(Debug, Clone)]
pub struct MotorFaultDecoder {
    id: u8,
    derated: bool,
}

impl MotorFaultDecoder {
    /// Create a decoder for motor `id`
    pub fn new(id: u8) -> Self {
        Self { id, derated: false }
    }

    /// Motor index
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Whether drive current is currently derated
    pub fn is_derated(&self) -> bool {
        self.derated
    }

    /// Decode one snapshot
    pub fn decode(&mut self, status: MotorStatus, now_ms: u32) -> MotorDecode {
        if let Some(kind) = classify(status) {
            // Fatal condition preempts the warning; derate state is left alone
            return MotorDecode {
                fault: Some(FaultCode::new(kind, self.id, now_ms)),
                derate_change: None,
            };
        }

        let warning = status.contains(MotorStatus::THERMAL_WARNING);
        let derate_change = if warning != self.derated {
            self.derated = warning;
            Some(warning)
        } else {
            None
        };

        MotorDecode {
            fault: None,
            derate_change,
        }
    }

    /// Forget derate state (driver re-initialized)
    pub fn reset(&mut self) {
        self.derated = false;
    }
}
