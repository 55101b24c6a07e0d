//! Safety supervisor task
//!
//! Runs the supervisor at a fixed rate: copies in the latest readings,
//! ticks, publishes the snapshot and handles operator commands between
//! ticks.

use defmt::*;
use embassy_time::{Duration, Instant, Ticker, Timer};

use twinstep_core::safety::SafetySupervisor;

use crate::board::Board;
use crate::channels::{now_ms, OperatorCommand, ESTOP, OPERATOR_COMMANDS, SAFETY_STATE};

/// Time given to the driver task to apply stop commands before a restart
const RESTART_DELAY_MS: u64 = 20;

/// Supervisor task
#[embassy_executor::task]
pub async fn supervisor_task(mut supervisor: SafetySupervisor, mut board: Board) {
    let interval_ms = supervisor.config().tick_interval_ms as u64;
    info!("Supervisor task started, {} ms period", interval_ms);

    let interval = Duration::from_millis(interval_ms);
    let mut ticker = Ticker::every(interval);
    let mut deadline = Instant::now() + interval;

    loop {
        ticker.next().await;

        // Late wake-ups mean other work is hogging the executor
        let woke = Instant::now();
        let late = woke.saturating_duration_since(deadline);
        let load = (late.as_micros() * 100 / interval.as_micros().max(1)).min(100) as u8;
        deadline = woke.max(deadline) + interval;

        while let Ok(command) = OPERATOR_COMMANDS.try_receive() {
            handle_operator_command(&mut supervisor, command);
        }

        board.refresh(load);
        let now = now_ms();
        let report = supervisor.tick(&mut board, &ESTOP, now);

        for (from, to) in report.transitions.iter() {
            info!("Supervisor {:?} -> {:?}", from, to);
        }
        if let Some(outcome) = report.recovery {
            debug!("Recovery: {:?}", outcome);
        }

        let snapshot = supervisor.snapshot();
        SAFETY_STATE.lock(|cell| cell.set(snapshot));

        if board.take_restart_request() {
            Timer::after_millis(RESTART_DELAY_MS).await;
            board.restart();
        }
    }
}

fn handle_operator_command(supervisor: &mut SafetySupervisor, command: OperatorCommand) {
    match command {
        OperatorCommand::Acknowledge => {
            if let Err(e) = supervisor.acknowledge_emergency() {
                warn!("Acknowledge ignored: {:?}", e);
            }
        }
        OperatorCommand::Clear => {
            if let Err(e) = supervisor.clear_manual_intervention() {
                warn!("Clear ignored: {:?}", e);
            }
        }
        OperatorCommand::Move {
            motor,
            target_deg,
            v_max,
            accel,
        } => match supervisor.submit_motion_request(motor, target_deg, v_max, accel, now_ms()) {
            Ok(handle) => info!("Move accepted on motor {} (gen {})", motor, handle.generation),
            Err(reason) => warn!("Move on motor {} rejected: {:?}", motor, reason),
        },
    }
}
