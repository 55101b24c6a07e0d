//! Periodic safety supervisor
//!
//! One call to [`SafetySupervisor::tick`] per period. Within a tick the
//! order is fixed: drain the emergency-stop latch, aggregate faults, drive
//! the state machine (fail-safe first, then recovery), gate the watchdog,
//! publish the snapshot. The tick never blocks.

use heapless::Vec;

use crate::config::{ConfigError, SafetyConfig};
use crate::motion::{MotionHandle, MotionProfileEngine, Phase, RejectReason};
use crate::state::{Event, SupervisorState};
use crate::traits::{MotorActuator, SafetyHardware, Subsystem};

use super::aggregator::{AggregateReport, FaultAggregator};
use super::elapsed_ms;
use super::estop::EmergencyStopLatch;
use super::executor::FailSafeExecutor;
use super::fault::{FailSafeAction, FaultCode, FaultKind};
use super::history::FaultHistory;
use super::recovery::{RecoveryManager, RecoveryOutcome, RecoveryStrategy};
use super::snapshot::SystemSafetyState;

/// Most transitions a single tick can take
const MAX_TRANSITIONS_PER_TICK: usize = 4;

/// Errors from operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorError {
    /// Acknowledge requested while no emergency stop is latched
    NotInEmergencyStop,
    /// Clear requested while no manual intervention is pending
    NoInterventionPending,
    /// Configuration failed validation
    Config(ConfigError),
}

impl From<ConfigError> for SupervisorError {
    fn from(e: ConfigError) -> Self {
        SupervisorError::Config(e)
    }
}

/// All mutable supervisor state, owned by the supervisor task
#[derive(Debug, Clone)]
pub struct SupervisorContext {
    pub aggregator: FaultAggregator,
    pub executor: FailSafeExecutor,
    pub recovery: RecoveryManager,
    pub motion: MotionProfileEngine,
    pub history: FaultHistory,
    pub safety_state: SystemSafetyState,
}

impl SupervisorContext {
    fn new(config: &SafetyConfig, now_ms: u32) -> Self {
        Self {
            aggregator: FaultAggregator::new(config, now_ms),
            executor: FailSafeExecutor::new(),
            recovery: RecoveryManager::new(),
            motion: MotionProfileEngine::new(),
            history: FaultHistory::new(),
            safety_state: SystemSafetyState::default(),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// State at the end of the tick
    pub state: SupervisorState,
    /// Worst fault surfaced by the aggregator
    pub worst: Option<FaultCode>,
    /// Fail-safe action in effect after this tick's fault handling
    pub action: Option<FailSafeAction>,
    /// Recovery evaluation result
    pub recovery: Option<RecoveryOutcome>,
    /// The watchdog was fed
    pub watchdog_serviced: bool,
    /// State transitions taken, in order
    pub transitions: Vec<(SupervisorState, SupervisorState), MAX_TRANSITIONS_PER_TICK>,
}

/// Safety supervisor
#[derive(Debug, Clone)]
pub struct SafetySupervisor {
    config: SafetyConfig,
    ctx: SupervisorContext,
    state: SupervisorState,
    /// Worst fault of the previous tick, for onset detection
    last_worst: Option<FaultCode>,
    /// Start of the current fault episode, across every category
    episode_start_ms: Option<u32>,
}

impl SafetySupervisor {
    /// Create a supervisor from a validated configuration
    pub fn new(config: SafetyConfig, now_ms: u32) -> Result<Self, SupervisorError> {
        config.validate()?;
        let ctx = SupervisorContext::new(&config, now_ms);
        Ok(Self {
            config,
            ctx,
            state: SupervisorState::Normal,
            last_worst: None,
            episode_start_ms: None,
        })
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Read access to every component
    pub fn context(&self) -> &SupervisorContext {
        &self.ctx
    }

    /// Published safety state
    pub fn snapshot(&self) -> SystemSafetyState {
        self.ctx.safety_state
    }

    /// Fault history, most recent first
    pub fn fault_history(&self) -> &FaultHistory {
        &self.ctx.history
    }

    /// Run one supervision period
    pub fn tick<H>(&mut self, hw: &mut H, estop: &EmergencyStopLatch, now_ms: u32) -> TickReport
    where
        H: SafetyHardware + ?Sized,
    {
        let mut report = TickReport::default();

        if estop.take() {
            self.enter_emergency(hw, now_ms, &mut report);
        }

        let aggregate = self.ctx.aggregator.evaluate(&*hw, &self.config, now_ms);
        self.apply_derates(hw, &aggregate, now_ms);

        let worst = aggregate.worst;
        let onset = match (worst, self.last_worst) {
            (Some(current), Some(previous)) => !current.same_condition(&previous),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if let Some(fault) = worst.filter(|_| onset) {
            warn!("Fault {:?} on source {}", fault.kind, fault.source);
            self.ctx.history.push(fault, now_ms);
        }
        self.last_worst = worst;
        self.ctx.safety_state.active_fault = worst;
        report.worst = worst;

        if self.state != SupervisorState::EmergencyStop {
            self.drive(hw, worst, now_ms, &mut report);
        }

        // Never feed on a tick that just detected a new fault
        let serviced = worst.is_none() || (self.state.is_latched() && !onset);
        if serviced {
            hw.service_watchdog();
        }
        report.watchdog_serviced = serviced;

        self.publish();
        report.state = self.state;
        report
    }

    /// Leave the emergency stop
    ///
    /// Outputs stay latched until the next tick that finds no fault.
    pub fn acknowledge_emergency(&mut self) -> Result<(), SupervisorError> {
        if self.state != SupervisorState::EmergencyStop {
            return Err(SupervisorError::NotInEmergencyStop);
        }
        info!("Emergency stop acknowledged");
        self.state = self.state.transition(Event::AcknowledgeEmergency);
        self.publish();
        Ok(())
    }

    /// Clear a manual-intervention condition
    ///
    /// Resets every recovery counter. Outputs stay latched until the next
    /// tick that finds no fault.
    pub fn clear_manual_intervention(&mut self) -> Result<(), SupervisorError> {
        if self.state != SupervisorState::ManualInterventionPending {
            return Err(SupervisorError::NoInterventionPending);
        }
        info!("Manual intervention cleared");
        self.ctx.recovery.clear();
        self.state = self.state.transition(Event::ClearManualIntervention);
        self.publish();
        Ok(())
    }

    /// Validate and start a move
    pub fn submit_motion_request(
        &mut self,
        motor: u8,
        target_deg: f32,
        v_max: f32,
        accel: f32,
        now_ms: u32,
    ) -> Result<MotionHandle, RejectReason> {
        let result = if !self.state.motion_allowed() || self.ctx.executor.latched().is_some() {
            Err(RejectReason::NotReady)
        } else {
            self.ctx
                .motion
                .submit(motor, target_deg, v_max, accel, &self.config.motion, now_ms)
        };
        result.map_err(|reason| {
            debug!("Move on motor {} rejected: {:?}", motor, reason);
            reason
        })
    }

    /// Phase of a move
    pub fn motion_phase(&self, handle: MotionHandle, now_ms: u32) -> Phase {
        self.ctx.motion.phase(handle, now_ms)
    }

    fn enter_emergency<H>(&mut self, hw: &mut H, now_ms: u32, report: &mut TickReport)
    where
        H: SafetyHardware + ?Sized,
    {
        if self.state != SupervisorState::EmergencyStop {
            warn!("Emergency stop latched");
            self.ctx.safety_state.last_emergency_ms = Some(now_ms);
            self.transition(Event::EmergencyStop, report);
        }
        report.action = Some(self.ctx.executor.apply(FailSafeAction::MotorHiZ, hw));
        self.ctx.motion.abort_all(now_ms);
    }

    fn drive<H>(&mut self, hw: &mut H, worst: Option<FaultCode>, now_ms: u32, report: &mut TickReport)
    where
        H: SafetyHardware + ?Sized,
    {
        match (self.state, worst) {
            (SupervisorState::Normal, Some(fault)) => {
                self.episode_start_ms = Some(now_ms);
                self.transition(Event::FaultDetected(fault), report);
                self.handle_fault(hw, &fault, now_ms, report);
            }
            (SupervisorState::Normal, None) => {
                // Left over from an acknowledged stop or a manual clear
                if self.ctx.executor.latched().is_some() {
                    self.ctx.executor.release(hw);
                }
            }
            (SupervisorState::FaultDetected | SupervisorState::Recovering, Some(fault)) => {
                self.handle_fault(hw, &fault, now_ms, report);
            }
            (SupervisorState::FaultDetected | SupervisorState::Recovering, None) => {
                info!("Recovered");
                self.episode_start_ms = None;
                self.ctx.recovery.on_success();
                self.ctx.executor.release(hw);
                self.transition(Event::FaultCleared, report);
            }
            (SupervisorState::ManualInterventionPending, Some(fault)) => {
                // Outputs stay latched; a worse fault may still tighten them
                report.action = Some(self.ctx.executor.execute(
                    &fault,
                    hw,
                    &mut self.ctx.safety_state,
                    now_ms,
                ));
            }
            (SupervisorState::ManualInterventionPending, None) | (SupervisorState::EmergencyStop, _) => {}
        }
    }

    fn handle_fault<H>(&mut self, hw: &mut H, fault: &FaultCode, now_ms: u32, report: &mut TickReport)
    where
        H: SafetyHardware + ?Sized,
    {
        let action = self
            .ctx
            .executor
            .execute(fault, hw, &mut self.ctx.safety_state, now_ms);
        report.action = Some(action);
        self.ctx.motion.abort_all(now_ms);

        let outcome = self
            .ctx
            .recovery
            .attempt(fault, &self.config.recovery, hw, now_ms);
        report.recovery = Some(outcome);

        match outcome {
            RecoveryOutcome::Attempted {
                strategy: RecoveryStrategy::SoftReset(subsystem),
                ..
            } => self.reinitialize(hw, subsystem),
            RecoveryOutcome::Escalated => {
                self.escalate(report);
                return;
            }
            _ => {}
        }

        // Each category backs off on its own clock; the watchdog only sees
        // the whole episode
        let window = self.config.recovery.recovery_window_ms();
        let exhausted = self
            .episode_start_ms
            .is_some_and(|start| elapsed_ms(now_ms, start) >= window);
        if exhausted {
            error!("Fault episode outlasted the {} ms recovery window", window);
            self.ctx.recovery.escalate(fault);
            report.recovery = Some(RecoveryOutcome::Escalated);
            self.escalate(report);
            return;
        }

        if self.state == SupervisorState::FaultDetected {
            self.transition(Event::RecoveryStarted, report);
        }
    }

    fn escalate(&mut self, report: &mut TickReport) {
        self.episode_start_ms = None;
        self.transition(Event::RecoveryEscalated, report);
    }

    /// Forget detector state for a subsystem that was just reset
    fn reinitialize<A>(&mut self, actuator: &mut A, subsystem: Subsystem)
    where
        A: MotorActuator + ?Sized,
    {
        match subsystem {
            Subsystem::Encoder(id) => {
                if let Some(validator) = self.ctx.aggregator.encoder_mut(id) {
                    validator.reset();
                }
            }
            Subsystem::Motor(id) => {
                if let Some(decoder) = self.ctx.aggregator.motor_mut(id) {
                    decoder.reset();
                }
                if let Some(derated) = self.ctx.safety_state.derated.get_mut(id as usize) {
                    if *derated {
                        actuator.set_current_derate(id, false);
                        *derated = false;
                    }
                }
            }
            Subsystem::Channel(_) => {}
        }
    }

    fn apply_derates<A>(&mut self, actuator: &mut A, aggregate: &AggregateReport, now_ms: u32)
    where
        A: MotorActuator + ?Sized,
    {
        for (motor, change) in aggregate.derate_changes.iter().enumerate() {
            let Some(derate) = *change else { continue };
            let id = motor as u8;

            actuator.set_current_derate(id, derate);
            self.ctx.safety_state.derated[motor] = derate;
            if derate {
                warn!("Motor {} thermal pre-warning, derating", id);
                self.ctx
                    .history
                    .push(FaultCode::new(FaultKind::MotorThermalWarning, id, now_ms), now_ms);
            } else {
                info!("Motor {} derate released", id);
            }
        }
    }

    fn transition(&mut self, event: Event, report: &mut TickReport) {
        let next = self.state.transition(event);
        if next != self.state {
            info!("Supervisor {:?} -> {:?}", self.state, next);
            // Bounded by the state graph; a full list only drops the report entry
            let _ = report.transitions.push((self.state, next));
            self.state = next;
        }
    }

    fn publish(&mut self) {
        let published = &mut self.ctx.safety_state;
        published.supervisor_state = self.state;
        published.emergency_stop_active = self.state == SupervisorState::EmergencyStop;
        published.recovery_required = self.state == SupervisorState::ManualInterventionPending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{EncoderSample, FaultCategory, MotorStatus};
    use crate::traits::{ResetController, ResetError, SensorSource, Watchdog};
    use crate::{ENCODER_COUNT, MOTOR_COUNT};
    use proptest::prelude::*;

    const TICK_MS: u32 = 5;

    /// Simulated board: sensor inputs plus a log of every actuation
    #[derive(Default)]
    struct MockBoard {
        motors: [MotorStatus; MOTOR_COUNT],
        encoders: [Option<EncoderSample>; ENCODER_COUNT],
        encoder_silent: [bool; ENCODER_COUNT],
        activity: [Option<u32>; 2],
        host_silent: bool,
        stack: u8,
        cpu: u8,

        actions: std::vec::Vec<(u8, Option<FailSafeAction>)>,
        derates: std::vec::Vec<(u8, bool)>,
        feeds: std::vec::Vec<u32>,
        soft_resets: std::vec::Vec<Subsystem>,
        hard_resets: u32,
        now: u32,
    }

    impl MockBoard {
        fn new() -> Self {
            Self {
                stack: 60,
                cpu: 30,
                ..Default::default()
            }
        }

        /// Fresh samples and traffic from every source that is not silenced
        fn refresh(&mut self, now: u32) {
            self.now = now;
            for (i, sample) in self.encoders.iter_mut().enumerate() {
                if !self.encoder_silent[i] {
                    *sample = Some(EncoderSample {
                        position_deg: 90.0,
                        magnitude: 2000,
                        timestamp_ms: now,
                    });
                }
            }
            if !self.host_silent {
                self.activity[0] = Some(now);
            }
            self.activity[1] = Some(now);
        }

        fn applied(&self, motor: u8) -> Option<Option<FailSafeAction>> {
            self.actions
                .iter()
                .rev()
                .find(|(m, _)| *m == motor)
                .map(|(_, a)| *a)
        }
    }

    impl SensorSource for MockBoard {
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

    impl MotorActuator for MockBoard {
        fn apply_motor_action(&mut self, motor: u8, action: FailSafeAction) {
            self.actions.push((motor, Some(action)));
        }

        fn release_motor(&mut self, motor: u8) {
            self.actions.push((motor, None));
        }

        fn set_current_derate(&mut self, motor: u8, derate: bool) {
            self.derates.push((motor, derate));
        }
    }

    impl Watchdog for MockBoard {
        fn service_watchdog(&mut self) {
            self.feeds.push(self.now);
        }
    }

    impl ResetController for MockBoard {
        fn request_soft_reset(&mut self, subsystem: Subsystem) -> Result<(), ResetError> {
            self.soft_resets.push(subsystem);
            Ok(())
        }

        fn request_hard_reset(&mut self) -> Result<(), ResetError> {
            self.hard_resets += 1;
            Ok(())
        }
    }

    struct Harness {
        supervisor: SafetySupervisor,
        board: MockBoard,
        estop: EmergencyStopLatch,
        now: u32,
        transitions: std::vec::Vec<(SupervisorState, SupervisorState)>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                supervisor: SafetySupervisor::new(SafetyConfig::default(), 0).unwrap(),
                board: MockBoard::new(),
                estop: EmergencyStopLatch::new(),
                now: 0,
                transitions: std::vec::Vec::new(),
            }
        }

        fn tick(&mut self) -> TickReport {
            self.now += TICK_MS;
            self.board.refresh(self.now);
            let report = self.supervisor.tick(&mut self.board, &self.estop, self.now);
            self.transitions.extend(report.transitions.iter().copied());
            report
        }

        fn run_until(&mut self, end_ms: u32) {
            while self.now < end_ms {
                self.tick();
            }
        }
    }

    #[test]
    fn test_clean_ticks_feed_watchdog() {
        let mut h = Harness::new();
        for _ in 0..10 {
            let report = h.tick();
            assert!(report.watchdog_serviced);
            assert_eq!(report.state, SupervisorState::Normal);
        }
        assert_eq!(h.board.feeds.len(), 10);
        assert!(h.board.actions.is_empty());
    }

    #[test]
    fn test_overcurrent_scenario() {
        let mut h = Harness::new();
        h.tick();
        h.board.motors[1] = MotorStatus::OVERCURRENT;

        let report = h.tick();

        assert_eq!(report.worst.map(|f| f.kind), Some(FaultKind::MotorOvercurrent));
        assert_eq!(report.action, Some(FailSafeAction::MotorHiZ));
        assert!(!report.watchdog_serviced);
        assert_eq!(h.board.applied(0), Some(Some(FailSafeAction::MotorHiZ)));
        assert_eq!(h.board.applied(1), Some(Some(FailSafeAction::MotorHiZ)));

        let snapshot = h.supervisor.snapshot();
        let reason = snapshot.last_stop_reason.unwrap();
        assert_eq!(reason.kind, FaultKind::MotorOvercurrent);
        assert_eq!(reason.source, 1);
        assert_eq!(snapshot.supervisor_state, SupervisorState::Recovering);
        assert_eq!(h.board.soft_resets, [Subsystem::Motor(1)]);
    }

    #[test]
    fn test_encoder_timeout_escalates_to_manual() {
        let config = SafetyConfig::default();
        let mut h = Harness::new();
        h.board.encoder_silent[0] = true;

        h.run_until(3000);

        assert_eq!(
            h.transitions,
            [
                (SupervisorState::Normal, SupervisorState::FaultDetected),
                (SupervisorState::FaultDetected, SupervisorState::Recovering),
                (SupervisorState::Recovering, SupervisorState::ManualInterventionPending),
            ]
        );
        assert_eq!(h.board.soft_resets, [Subsystem::Encoder(0); 3]);
        assert_eq!(
            h.supervisor.context().recovery.state(FaultCategory::Encoder).attempt_count,
            3
        );

        let snapshot = h.supervisor.snapshot();
        assert!(snapshot.recovery_required);
        assert_eq!(
            snapshot.last_stop_reason.map(|f| f.kind),
            Some(FaultKind::EncoderTimeout)
        );

        // Hardware watchdog never starved during the bounded recovery
        assert!(longest_unfed(&h) < config.watchdog_timeout_ms);

        // Outputs stay latched and motion is refused
        assert_eq!(h.board.applied(0), Some(Some(FailSafeAction::MotorStop)));
        assert_eq!(
            h.supervisor.submit_motion_request(0, 90.0, 100.0, 100.0, h.now),
            Err(RejectReason::NotReady)
        );

        // Encoder comes back, but only an explicit clear leaves the state
        h.board.encoder_silent[0] = false;
        h.run_until(3100);
        assert_eq!(h.supervisor.state(), SupervisorState::ManualInterventionPending);

        h.supervisor.clear_manual_intervention().unwrap();
        h.tick();
        assert_eq!(h.supervisor.state(), SupervisorState::Normal);
        assert_eq!(h.board.applied(0), Some(None));
        assert_eq!(
            h.supervisor.context().recovery.state(FaultCategory::Encoder).attempt_count,
            0
        );
    }

    /// Longest stretch without a watchdog feed, up to the current time
    fn longest_unfed(h: &Harness) -> u32 {
        let mut last_feed = 0;
        let mut longest = 0;
        for feed in &h.board.feeds {
            longest = longest.max(feed - last_feed);
            last_feed = *feed;
        }
        longest.max(h.now - last_feed)
    }

    #[test]
    fn test_faults_in_sequence_share_one_recovery_window() {
        let config = SafetyConfig::default();
        let window = config.recovery.recovery_window_ms();
        let mut h = Harness::new();
        h.tick();

        // Host link dies; a motor loses steps before the link category
        // has used up its attempts
        h.board.host_silent = true;
        h.run_until(1400);
        assert_eq!(h.supervisor.state(), SupervisorState::Recovering);
        h.board.motors[0] = MotorStatus::STEP_LOSS_A;

        h.run_until(4000);

        assert_eq!(h.supervisor.state(), SupervisorState::ManualInterventionPending);
        let onset = h.supervisor.fault_history().iter().last().unwrap().timestamp_ms;
        let escalated = h.board.feeds.iter().copied().find(|t| *t > onset).unwrap();
        assert!(escalated - onset <= window + 2 * TICK_MS);
        assert!(longest_unfed(&h) < config.watchdog_timeout_ms);
        assert!(h.supervisor.context().recovery.is_escalated());

        // Stays put until cleared
        h.board.motors[0] = MotorStatus::empty();
        h.board.host_silent = false;
        h.run_until(4200);
        assert_eq!(h.supervisor.state(), SupervisorState::ManualInterventionPending);
        h.supervisor.clear_manual_intervention().unwrap();
        h.tick();
        assert_eq!(h.supervisor.state(), SupervisorState::Normal);
    }

    #[test]
    fn test_single_category_escalates_on_its_own_schedule() {
        let mut h = Harness::new();
        h.board.encoder_silent[1] = true;
        h.run_until(3000);

        // Third attempt used before the episode limit takes over
        assert_eq!(h.board.soft_resets, [Subsystem::Encoder(1); 3]);
        assert_eq!(h.supervisor.state(), SupervisorState::ManualInterventionPending);
    }

    #[test]
    fn test_comm_timeout_recovers() {
        let mut h = Harness::new();
        h.tick();
        h.board.host_silent = true;
        h.run_until(600);
        assert_eq!(h.supervisor.state(), SupervisorState::Recovering);
        assert_eq!(h.board.soft_resets, [Subsystem::Channel(0)]);

        h.board.host_silent = false;
        let report = h.tick();
        assert_eq!(report.state, SupervisorState::Normal);
        assert!(report.watchdog_serviced);
        assert_eq!(h.board.applied(0), Some(None));
        assert_eq!(
            *h.supervisor.context().recovery.state(FaultCategory::Comm),
            Default::default()
        );
        // The stop reason survives recovery
        assert_eq!(
            h.supervisor.snapshot().last_stop_reason.map(|f| f.kind),
            Some(FaultKind::CommTimeout)
        );
    }

    #[test]
    fn test_emergency_stop_is_sticky() {
        let mut h = Harness::new();
        h.tick();
        let handle = h.supervisor.submit_motion_request(0, 400.0, 100.0, 50.0, h.now).unwrap();

        h.estop.trigger();
        let report = h.tick();
        assert_eq!(report.state, SupervisorState::EmergencyStop);
        assert_eq!(report.action, Some(FailSafeAction::MotorHiZ));
        assert_eq!(h.board.applied(1), Some(Some(FailSafeAction::MotorHiZ)));
        assert_eq!(h.supervisor.motion_phase(handle, h.now), Phase::Aborted);
        assert!(h.supervisor.snapshot().emergency_stop_active);

        // Faults come and go; the state does not move
        h.board.motors[0] = MotorStatus::THERMAL_SHUTDOWN;
        h.run_until(500);
        h.board.motors[0] = MotorStatus::empty();
        h.run_until(1000);
        assert_eq!(h.supervisor.state(), SupervisorState::EmergencyStop);
        assert!(h.board.soft_resets.is_empty());
        assert_eq!(
            h.supervisor.clear_manual_intervention(),
            Err(SupervisorError::NoInterventionPending)
        );
        assert_eq!(
            h.supervisor.submit_motion_request(0, 10.0, 10.0, 10.0, h.now),
            Err(RejectReason::NotReady)
        );

        h.supervisor.acknowledge_emergency().unwrap();
        assert_eq!(h.supervisor.state(), SupervisorState::Normal);
        assert_eq!(
            h.supervisor.acknowledge_emergency(),
            Err(SupervisorError::NotInEmergencyStop)
        );

        h.tick();
        assert_eq!(h.board.applied(0), Some(None));
        assert!(h.supervisor.submit_motion_request(0, 10.0, 10.0, 10.0, h.now).is_ok());
    }

    #[test]
    fn test_emergency_stop_feeds_watchdog_while_fault_persists() {
        let mut h = Harness::new();
        h.estop.trigger();
        h.board.motors[0] = MotorStatus::OVERCURRENT;

        let report = h.tick();
        assert!(!report.watchdog_serviced);
        let report = h.tick();
        assert!(report.watchdog_serviced);
    }

    #[test]
    fn test_fault_aborts_motion() {
        let mut h = Harness::new();
        h.tick();
        let handle = h.supervisor.submit_motion_request(1, 400.0, 100.0, 50.0, h.now).unwrap();
        assert_eq!(h.supervisor.motion_phase(handle, h.now + 100), Phase::Accelerating);

        h.board.motors[1] = MotorStatus::STEP_LOSS_A;
        h.tick();
        assert_eq!(h.supervisor.motion_phase(handle, h.now), Phase::Aborted);
    }

    #[test]
    fn test_motion_limits_enforced() {
        let mut h = Harness::new();
        let limits = h.supervisor.config().motion;
        assert_eq!(
            h.supervisor
                .submit_motion_request(0, 90.0, limits.max_velocity_dps * 2.0, 100.0, 0),
            Err(RejectReason::VelocityLimit)
        );
        assert_eq!(
            h.supervisor.submit_motion_request(2, 90.0, 100.0, 100.0, 0),
            Err(RejectReason::InvalidMotor)
        );
    }

    #[test]
    fn test_thermal_warning_derates_without_fault() {
        let mut h = Harness::new();
        h.board.motors[0] = MotorStatus::THERMAL_WARNING;

        let report = h.tick();
        assert_eq!(report.state, SupervisorState::Normal);
        assert!(report.watchdog_serviced);
        assert_eq!(h.board.derates, [(0, true)]);
        assert_eq!(h.supervisor.snapshot().derated, [true, false]);
        assert_eq!(
            h.supervisor.fault_history().latest().map(|r| r.code.kind),
            Some(FaultKind::MotorThermalWarning)
        );

        h.run_until(100);
        assert_eq!(h.board.derates.len(), 1);

        h.board.motors[0] = MotorStatus::empty();
        h.tick();
        assert_eq!(h.board.derates, [(0, true), (0, false)]);
        assert_eq!(h.supervisor.fault_history().len(), 1);
    }

    #[test]
    fn test_history_records_onsets_only() {
        let mut h = Harness::new();
        h.board.motors[0] = MotorStatus::UNDERVOLTAGE;
        h.run_until(200);
        assert_eq!(h.supervisor.fault_history().len(), 1);

        h.board.motors[0] = MotorStatus::OVERCURRENT;
        h.tick();
        let kinds: std::vec::Vec<FaultKind> = h
            .supervisor
            .fault_history()
            .iter()
            .map(|r| r.code.kind)
            .collect();
        assert_eq!(kinds, [FaultKind::MotorOvercurrent, FaultKind::MotorUndervoltage]);
    }

    #[test]
    fn test_resource_exhaustion_requests_restart() {
        let mut h = Harness::new();
        h.board.stack = 2;

        let report = h.tick();
        assert_eq!(report.action, Some(FailSafeAction::SystemReset));
        assert_eq!(h.board.hard_resets, 1);
        assert!(h.supervisor.snapshot().restart_scheduled);
        assert_eq!(h.board.applied(0), Some(Some(FailSafeAction::MotorStop)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SafetyConfig::default();
        config.recovery.max_attempts = 0;
        assert!(matches!(
            SafetySupervisor::new(config, 0),
            Err(SupervisorError::Config(ConfigError::NoRecoveryAttempts))
        ));
    }

    proptest! {
        #[test]
        fn prop_emergency_stop_only_exits_on_acknowledge(
            inputs in proptest::collection::vec((0u16..64, any::<bool>(), any::<bool>(), 0u8..100), 1..80)
        ) {
            let mut h = Harness::new();
            h.estop.trigger();
            h.tick();

            for (bits, encoder_silent, host_silent, stack) in inputs {
                h.board.motors[0] = MotorStatus::from_bits_truncate(bits);
                h.board.encoder_silent[1] = encoder_silent;
                h.board.host_silent = host_silent;
                h.board.stack = stack;

                let report = h.tick();
                prop_assert_eq!(report.state, SupervisorState::EmergencyStop);
                prop_assert!(report.transitions.is_empty());
            }
            prop_assert!(h.board.soft_resets.is_empty());
            prop_assert_eq!(h.board.hard_resets, 0);
        }
    }
}
