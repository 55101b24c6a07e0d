//! Fault codes and fail-safe actions
//!
//! Every fault kind maps to exactly one default fail-safe action and one
//! recovery strategy. Both mappings are exhaustive matches, so a new fault
//! kind does not compile until every table is updated.

/// Kind of detected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Driver short to ground or supply on either phase
    MotorOvercurrent,
    /// Driver over-temperature shutdown
    MotorThermalShutdown,
    /// Driver over-temperature pre-warning (non-fatal, derates current)
    MotorThermalWarning,
    /// Charge pump / supply undervoltage
    MotorUndervoltage,
    /// Open load on a phase, steps are not reaching the motor
    MotorStepLoss,
    /// Encoder sample older than the allowed age
    EncoderTimeout,
    /// Implausible angular change between samples
    EncoderJump,
    /// Magnet too weak or too strong
    EncoderFieldError,
    /// Safety-critical communication channel went silent
    CommTimeout,
    /// Stack or CPU headroom exhausted
    ResourceExhaustion,
}

/// Fault source category, in descending precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCategory {
    /// Motor driver faults (highest precedence)
    Motor,
    /// Position encoder faults
    Encoder,
    /// Communication link faults
    Comm,
    /// System resource faults (lowest precedence)
    Resource,
}

impl FaultCategory {
    /// Number of categories
    pub const COUNT: usize = 4;

    /// All categories, highest precedence first
    pub const ALL: [FaultCategory; Self::COUNT] = [
        FaultCategory::Motor,
        FaultCategory::Encoder,
        FaultCategory::Comm,
        FaultCategory::Resource,
    ];

    /// Stable bucket index for per-category bookkeeping
    pub const fn index(self) -> usize {
        match self {
            FaultCategory::Motor => 0,
            FaultCategory::Encoder => 1,
            FaultCategory::Comm => 2,
            FaultCategory::Resource => 3,
        }
    }
}

impl FaultKind {
    /// Category this fault belongs to
    pub const fn category(self) -> FaultCategory {
        match self {
            FaultKind::MotorOvercurrent
            | FaultKind::MotorThermalShutdown
            | FaultKind::MotorThermalWarning
            | FaultKind::MotorUndervoltage
            | FaultKind::MotorStepLoss => FaultCategory::Motor,
            FaultKind::EncoderTimeout | FaultKind::EncoderJump | FaultKind::EncoderFieldError => {
                FaultCategory::Encoder
            }
            FaultKind::CommTimeout => FaultCategory::Comm,
            FaultKind::ResourceExhaustion => FaultCategory::Resource,
        }
    }

    /// Stable numeric id used in logs and by the communication layer
    ///
    /// Id 0 is reserved for "no fault".
    pub const fn as_id(self) -> u8 {
        match self {
            FaultKind::MotorOvercurrent => 1,
            FaultKind::MotorThermalShutdown => 2,
            FaultKind::MotorThermalWarning => 3,
            FaultKind::MotorUndervoltage => 4,
            FaultKind::MotorStepLoss => 5,
            FaultKind::EncoderTimeout => 6,
            FaultKind::EncoderJump => 7,
            FaultKind::EncoderFieldError => 8,
            FaultKind::CommTimeout => 9,
            FaultKind::ResourceExhaustion => 10,
        }
    }

    /// Decode a numeric id
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(FaultKind::MotorOvercurrent),
            2 => Some(FaultKind::MotorThermalShutdown),
            3 => Some(FaultKind::MotorThermalWarning),
            4 => Some(FaultKind::MotorUndervoltage),
            5 => Some(FaultKind::MotorStepLoss),
            6 => Some(FaultKind::EncoderTimeout),
            7 => Some(FaultKind::EncoderJump),
            8 => Some(FaultKind::EncoderFieldError),
            9 => Some(FaultKind::CommTimeout),
            10 => Some(FaultKind::ResourceExhaustion),
            _ => None,
        }
    }

    /// Default fail-safe action for this fault
    pub const fn action(self) -> FailSafeAction {
        match self {
            FaultKind::MotorOvercurrent
            | FaultKind::MotorThermalShutdown
            | FaultKind::MotorUndervoltage => FailSafeAction::MotorHiZ,
            FaultKind::MotorStepLoss => FailSafeAction::MotorStop,
            FaultKind::MotorThermalWarning => FailSafeAction::MotorHold,
            // Sensor faults stop conservatively; HiZ would lose the position reference
            FaultKind::EncoderTimeout | FaultKind::EncoderJump | FaultKind::EncoderFieldError => {
                FailSafeAction::MotorStop
            }
            FaultKind::CommTimeout => FailSafeAction::MotorStop,
            FaultKind::ResourceExhaustion => FailSafeAction::SystemReset,
        }
    }
}

/// An active fault: what, where and when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultCode {
    /// Fault kind
    pub kind: FaultKind,
    /// Motor, encoder, channel or resource index
    pub source: u8,
    /// Detection time in milliseconds
    pub timestamp_ms: u32,
}

impl FaultCode {
    /// Create a new fault code
    pub const fn new(kind: FaultKind, source: u8, timestamp_ms: u32) -> Self {
        Self {
            kind,
            source,
            timestamp_ms,
        }
    }

    /// Category of this fault
    pub const fn category(&self) -> FaultCategory {
        self.kind.category()
    }

    /// Check whether two codes describe the same condition, ignoring time
    pub fn same_condition(&self, other: &FaultCode) -> bool {
        self.kind == other.kind && self.source == other.source
    }
}

/// Predetermined actuator response to a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailSafeAction {
    /// Decelerated stop on all motors
    MotorStop,
    /// Cut drive current immediately (high impedance)
    #[default]
    MotorHiZ,
    /// Stop with reduced holding current
    MotorHold,
    /// Stop all motors and schedule a full restart
    SystemReset,
}

impl FailSafeAction {
    /// Action for a raw fault id
    ///
    /// Returns `None` for id 0. Unknown non-zero ids fall back to `MotorHiZ`.
    pub const fn for_raw(id: u8) -> Option<Self> {
        if id == 0 {
            return None;
        }
        match FaultKind::from_id(id) {
            Some(kind) => Some(kind.action()),
            None => Some(FailSafeAction::MotorHiZ),
        }
    }

    /// Severity rank; outputs are never relaxed to a lower rank while latched
    pub const fn severity(self) -> u8 {
        match self {
            FailSafeAction::MotorHold => 1,
            FailSafeAction::MotorStop | FailSafeAction::SystemReset => 2,
            FailSafeAction::MotorHiZ => 3,
        }
    }

    /// Action actually driven into each motor
    pub const fn motor_action(self) -> FailSafeAction {
        match self {
            FailSafeAction::SystemReset => FailSafeAction::MotorStop,
            other => other,
        }
    }
}
