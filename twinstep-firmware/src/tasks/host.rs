//! Host link task
//!
//! Line-based protocol on UART0. Every well-formed line counts as activity
//! on the `host` channel and is answered with `OK`, `ERR` or a status line.
//!
//! ```text
//! PING            host heartbeat
//! PING UI         heartbeat relayed from the operator panel
//! ACK             acknowledge the emergency stop
//! CLEAR           clear a manual-intervention condition
//! MOVE m t v a    move motor m by t degrees at v deg/s, a deg/s^2
//! STATUS          report the safety snapshot
//! ```

use core::fmt::Write as _;

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::uart::BufferedUart;
use embedded_io_async::{Read, Write};
use heapless::{String, Vec};

use crate::channels::{
    now_ms, record_channel_activity, OperatorCommand, HOST_RESET, OPERATOR_COMMANDS,
    SAFETY_STATE,
};

/// Longest accepted line
const MAX_LINE: usize = 64;

/// One parsed host line
#[derive(Debug, Clone, Copy, PartialEq)]
enum HostLine {
    Ping { ui: bool },
    Command(OperatorCommand),
    Status,
}

fn parse_line(line: &str) -> Option<HostLine> {
    let mut words = line.split_whitespace();
    let line = match words.next()? {
        "PING" => match words.next() {
            None => HostLine::Ping { ui: false },
            Some("UI") => HostLine::Ping { ui: true },
            Some(_) => return None,
        },
        "ACK" => HostLine::Command(OperatorCommand::Acknowledge),
        "CLEAR" => HostLine::Command(OperatorCommand::Clear),
        "STATUS" => HostLine::Status,
        "MOVE" => HostLine::Command(OperatorCommand::Move {
            motor: words.next()?.parse().ok()?,
            target_deg: words.next()?.parse().ok()?,
            v_max: words.next()?.parse().ok()?,
            accel: words.next()?.parse().ok()?,
        }),
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(line)
}

fn format_status(out: &mut String<MAX_LINE>) {
    let state = SAFETY_STATE.lock(|cell| cell.get());
    let fault = state.active_fault.map(|f| f.kind.as_id()).unwrap_or(0);
    let _ = writeln!(
        out,
        "STATE {:?} FAULT {} ESTOP {} RESTART {}",
        state.supervisor_state,
        fault,
        state.emergency_stop_active as u8,
        state.restart_scheduled as u8,
    );
}

/// Host link task
///
/// `host` and `ui` are the channel indices from the safety configuration.
#[embassy_executor::task]
pub async fn host_task(mut uart: BufferedUart, host: Option<u8>, ui: Option<u8>) {
    info!("Host link task started");

    let mut line: Vec<u8, MAX_LINE> = Vec::new();
    let mut overflow = false;
    let mut buf = [0u8; 32];

    loop {
        let n = match select(uart.read(&mut buf), HOST_RESET.wait()).await {
            Either::First(Ok(n)) => n,
            Either::First(Err(e)) => {
                warn!("Host UART read error: {:?}", e);
                continue;
            }
            Either::Second(()) => {
                info!("Host link reset");
                line.clear();
                overflow = false;
                continue;
            }
        };

        for &byte in &buf[..n] {
            if byte != b'\n' {
                if byte != b'\r' && line.push(byte).is_err() {
                    overflow = true;
                }
                continue;
            }

            let parsed = if overflow {
                None
            } else {
                core::str::from_utf8(&line).ok().and_then(parse_line)
            };
            line.clear();
            overflow = false;

            let mut reply: String<MAX_LINE> = String::new();
            match parsed {
                Some(parsed) => {
                    let now = now_ms();
                    if let Some(host) = host {
                        record_channel_activity(host, now);
                    }
                    match parsed {
                        HostLine::Ping { ui: true } => {
                            if let Some(ui) = ui {
                                record_channel_activity(ui, now);
                            }
                            let _ = reply.push_str("OK\n");
                        }
                        HostLine::Ping { ui: false } => {
                            let _ = reply.push_str("OK\n");
                        }
                        HostLine::Command(command) => {
                            if OPERATOR_COMMANDS.try_send(command).is_ok() {
                                let _ = reply.push_str("OK\n");
                            } else {
                                warn!("Operator command queue full");
                                let _ = reply.push_str("BUSY\n");
                            }
                        }
                        HostLine::Status => format_status(&mut reply),
                    }
                }
                None => {
                    debug!("Malformed host line");
                    let _ = reply.push_str("ERR\n");
                }
            }

            if let Err(e) = uart.write_all(reply.as_bytes()).await {
                warn!("Host UART write error: {:?}", e);
            }
        }
    }
}
