//! Worst-wins fault aggregation
//!
//! Runs every detector once per tick and surfaces the single fault with the
//! highest category precedence. Within a category the lowest source index
//! wins, so the result is deterministic when several sources fault together.

use crate::config::SafetyConfig;
use crate::traits::SensorSource;
use crate::{ENCODER_COUNT, MOTOR_COUNT};

use super::comm::CommHealthTracker;
use super::encoder::EncoderValidator;
use super::fault::FaultCode;
use super::motor::MotorFaultDecoder;
use super::resource::ResourceMonitor;

/// Result of one aggregation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AggregateReport {
    /// Highest-precedence fault, or `None` when every source is clean
    pub worst: Option<FaultCode>,
    /// Per-motor derate edges reported by the decoders
    pub derate_changes: [Option<bool>; MOTOR_COUNT],
}

impl AggregateReport {
    /// Check if no source reported a fault
    pub fn is_clean(&self) -> bool {
        self.worst.is_none()
    }
}

/// Keep `current` unless `candidate` belongs to a higher-precedence category
pub fn worst_of(current: Option<FaultCode>, candidate: Option<FaultCode>) -> Option<FaultCode> {
    match (current, candidate) {
        (Some(c), Some(n)) if n.category() < c.category() => Some(n),
        (None, n) => n,
        (c, _) => c,
    }
}

/// Owner of every per-source detector
#[derive(Debug, Clone)]
pub struct FaultAggregator {
    motors: [MotorFaultDecoder; MOTOR_COUNT],
    encoders: [EncoderValidator; ENCODER_COUNT],
    comm: CommHealthTracker,
    resources: ResourceMonitor,
}

impl FaultAggregator {
    /// Build detectors for the configured hardware
    pub fn new(config: &SafetyConfig, now_ms: u32) -> Self {
        Self {
            motors: core::array::from_fn(|i| MotorFaultDecoder::new(i as u8)),
            encoders: core::array::from_fn(|i| EncoderValidator::new(i as u8, now_ms)),
            comm: CommHealthTracker::new(&config.channels, now_ms),
            resources: ResourceMonitor::new(),
        }
    }

    /// Run every detector against the latest snapshots
    pub fn evaluate<S>(&mut self, sensors: &S, config: &SafetyConfig, now_ms: u32) -> AggregateReport
    where
        S: SensorSource + ?Sized,
    {
        let mut report = AggregateReport::default();
        let mut worst = None;

        for (i, decoder) in self.motors.iter_mut().enumerate() {
            let decode = decoder.decode(sensors.read_motor_status(decoder.id()), now_ms);
            report.derate_changes[i] = decode.derate_change;
            worst = worst_of(worst, decode.fault);
        }

        for validator in self.encoders.iter_mut() {
            let sample = sensors.read_encoder_sample(validator.id());
            worst = worst_of(
                worst,
                validator.validate(sample.as_ref(), now_ms, &config.encoder),
            );
        }

        for channel in 0..self.comm.len() as u8 {
            if let Some(last) = sensors.channel_last_activity(channel) {
                self.comm.record_activity(channel, last);
            }
        }
        worst = worst_of(worst, self.comm.check_all(now_ms));

        let resources = sensors.resource_snapshot();
        worst = worst_of(
            worst,
            self.resources.check(&resources, &config.resources, now_ms),
        );

        report.worst = worst;
        report
    }

    /// Validator for one encoder
    pub fn encoder(&self, id: u8) -> Option<&EncoderValidator> {
        self.encoders.get(id as usize)
    }

    /// Mutable validator for one encoder
    pub fn encoder_mut(&mut self, id: u8) -> Option<&mut EncoderValidator> {
        self.encoders.get_mut(id as usize)
    }

    /// Decoder for one motor
    pub fn motor(&self, id: u8) -> Option<&MotorFaultDecoder> {
        self.motors.get(id as usize)
    }

    /// Mutable decoder for one motor
    pub fn motor_mut(&mut self, id: u8) -> Option<&mut MotorFaultDecoder> {
        self.motors.get_mut(id as usize)
    }

    /// Communication tracker
    pub fn comm(&self) -> &CommHealthTracker {
        &self.comm
    }

    /// Resource monitor
    pub fn resources(&self) -> &ResourceMonitor {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{EncoderSample, FaultCategory, FaultKind, MotorStatus};
    use proptest::prelude::*;

    /// Sensor snapshot with every source healthy unless overridden
    struct Snapshot {
        motors: [MotorStatus; MOTOR_COUNT],
        encoders: [Option<EncoderSample>; ENCODER_COUNT],
        activity: [Option<u32>; 2],
        stack: u8,
        cpu: u8,
    }

    impl Snapshot {
        fn healthy(now_ms: u32) -> Self {
            let sample = EncoderSample {
                position_deg: 90.0,
                magnitude: 2000,
                timestamp_ms: now_ms,
            };
            Self {
                motors: [MotorStatus::empty(); MOTOR_COUNT],
                encoders: [Some(sample); ENCODER_COUNT],
                activity: [Some(now_ms); 2],
                stack: 60,
                cpu: 30,
            }
        }
    }

    impl SensorSource for Snapshot {
        fn read_motor_status(&self, motor: u8) -> MotorStatus {
            self.motors[motor as usize]
        }

        fn read_encoder_sample(&self, encoder: u8) -> Option<EncoderSample> {
            self.encoders[encoder as usize]
        }

        fn channel_last_activity(&self, channel: u8) -> Option<u32> {
            self.activity.get(channel as usize).copied().flatten()
        }

        fn stack_headroom_percent(&self) -> u8 {
            self.stack
        }

        fn cpu_load_percent(&self) -> u8 {
            self.cpu
        }
    }

    #[test]
    fn test_all_clean() {
        let config = SafetyConfig::default();
        let mut aggregator = FaultAggregator::new(&config, 0);
        let report = aggregator.evaluate(&Snapshot::healthy(10), &config, 10);
        assert!(report.is_clean());
        assert_eq!(report.derate_changes, [None; MOTOR_COUNT]);
    }

    #[test]
    fn test_motor_beats_everything() {
        let config = SafetyConfig::default();
        let mut aggregator = FaultAggregator::new(&config, 0);

        let mut snapshot = Snapshot::healthy(1000);
        snapshot.motors[1] = MotorStatus::OVERCURRENT;
        snapshot.encoders[0] = None;
        snapshot.activity = [None, None];
        snapshot.stack = 1;

        let report = aggregator.evaluate(&snapshot, &config, 1000);
        let worst = report.worst.unwrap();
        assert_eq!(worst.kind, FaultKind::MotorOvercurrent);
        assert_eq!(worst.source, 1);
    }

    #[test]
    fn test_encoder_beats_comm() {
        let config = SafetyConfig::default();
        let mut aggregator = FaultAggregator::new(&config, 0);

        // Encoders healthy shortly before; links silent since start
        let mut earlier = Snapshot::healthy(960);
        earlier.activity = [Some(0), Some(0)];
        let report = aggregator.evaluate(&earlier, &config, 960);
        assert_eq!(report.worst.map(|f| f.kind), Some(FaultKind::CommTimeout));

        let mut snapshot = Snapshot::healthy(1000);
        snapshot.encoders[1] = Some(EncoderSample {
            position_deg: 90.0,
            magnitude: 10,
            timestamp_ms: 1000,
        });
        snapshot.activity = [Some(0), Some(0)];

        let report = aggregator.evaluate(&snapshot, &config, 1000);
        assert_eq!(report.worst.map(|f| f.kind), Some(FaultKind::EncoderFieldError));
    }

    #[test]
    fn test_non_critical_silence_is_clean() {
        let config = SafetyConfig::default();
        let mut aggregator = FaultAggregator::new(&config, 0);

        let mut snapshot = Snapshot::healthy(5000);
        snapshot.activity[1] = None;

        assert!(aggregator.evaluate(&snapshot, &config, 5000).is_clean());
        assert!(aggregator.comm().is_timed_out(1));
    }

    #[test]
    fn test_derate_edge_reported() {
        let config = SafetyConfig::default();
        let mut aggregator = FaultAggregator::new(&config, 0);

        let mut snapshot = Snapshot::healthy(10);
        snapshot.motors[0] = MotorStatus::THERMAL_WARNING;

        let report = aggregator.evaluate(&snapshot, &config, 10);
        assert!(report.is_clean());
        assert_eq!(report.derate_changes[0], Some(true));
        assert!(aggregator.motor(0).unwrap().is_derated());
    }

    fn category_of(index: u8) -> FaultKind {
        match index % 4 {
            0 => FaultKind::MotorStepLoss,
            1 => FaultKind::EncoderJump,
            2 => FaultKind::CommTimeout,
            _ => FaultKind::ResourceExhaustion,
        }
    }

    proptest! {
        #[test]
        fn prop_worst_of_picks_highest_category(kinds in proptest::collection::vec(0u8..8, 0..8)) {
            let codes: Vec<Option<FaultCode>> = kinds
                .iter()
                .enumerate()
                .map(|(i, k)| if *k < 4 { Some(FaultCode::new(category_of(*k), i as u8, 0)) } else { None })
                .collect();

            let merged = codes.iter().fold(None, |acc, c| worst_of(acc, *c));
            let expected: Option<FaultCategory> = codes.iter().flatten().map(|c| c.category()).min();
            prop_assert_eq!(merged.map(|c| c.category()), expected);

            // First source of the winning category wins ties
            if let Some(merged) = merged {
                let first = codes.iter().flatten().find(|c| c.category() == merged.category()).copied();
                prop_assert_eq!(Some(merged), first);
            }
        }
    }
}
