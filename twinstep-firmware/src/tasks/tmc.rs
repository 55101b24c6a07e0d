//! TMC2209 driver task
//!
//! Owns the shared single-wire UART (UART1 on GPIO8/GPIO9) and both
//! enable lines. Initializes the drivers, polls their status into the
//! sensor snapshot and carries out the supervisor's actuation requests.
//!
//! On a single-wire bus every byte sent is echoed back, so each transfer
//! reads its own echo before any reply.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::Output;
use embassy_rp::uart::{Async, Uart};
use embassy_time::{with_timeout, Duration, Ticker, Timer};

use twinstep_core::safety::FailSafeAction;
use twinstep_core::MOTOR_COUNT;
use twinstep_drivers::stepper::tmc2209::{
    combined_status, parse_read_response, reg, DrvStatus, GStat, Tmc2209Config, Tmc2209Driver,
    Tmc2209Error,
};

use crate::channels::{
    now_ms, publish_motor_status, record_channel_activity, TmcCommand, TMC_COMMANDS,
};

/// Status polling period
const POLL_INTERVAL_MS: u64 = 20;

/// Longest wait for an echo plus reply
const REPLY_TIMEOUT: Duration = Duration::from_millis(5);

/// Drivers, enable lines and the UART they share
pub struct TmcBus {
    uart: Uart<'static, Async>,
    drivers: [Tmc2209Driver; MOTOR_COUNT],
    /// Active-low enable lines
    enable: [Output<'static>; MOTOR_COUNT],
}

impl TmcBus {
    /// Create the bus with both drivers disabled
    pub fn new(
        uart: Uart<'static, Async>,
        configs: [Tmc2209Config; MOTOR_COUNT],
        mut enable: [Output<'static>; MOTOR_COUNT],
    ) -> Self {
        for pin in enable.iter_mut() {
            pin.set_high();
        }
        let [a, b] = configs;
        Self {
            uart,
            drivers: [Tmc2209Driver::new(a), Tmc2209Driver::new(b)],
            enable,
        }
    }

    async fn write_datagram(&mut self, datagram: &[u8; 8]) -> Result<(), Tmc2209Error> {
        self.uart.write(datagram).await.map_err(|_| Tmc2209Error::Bus)?;
        let mut echo = [0u8; 8];
        with_timeout(REPLY_TIMEOUT, self.uart.read(&mut echo))
            .await
            .map_err(|_| Tmc2209Error::Timeout)?
            .map_err(|_| Tmc2209Error::Bus)?;
        // Writes need a short idle gap before the next datagram
        Timer::after_micros(500).await;
        Ok(())
    }

    async fn read_register(&mut self, request: [u8; 4], register: u8) -> Result<u32, Tmc2209Error> {
        self.uart.write(&request).await.map_err(|_| Tmc2209Error::Bus)?;
        let mut frame = [0u8; 12];
        with_timeout(REPLY_TIMEOUT, self.uart.read(&mut frame))
            .await
            .map_err(|_| Tmc2209Error::Timeout)?
            .map_err(|_| Tmc2209Error::Bus)?;

        let mut reply = [0u8; 8];
        reply.copy_from_slice(&frame[4..]);
        parse_read_response(&reply, register)
    }

    /// Send the full register configuration, leaving the enable line alone
    async fn configure(&mut self, motor: usize) -> Result<(), Tmc2209Error> {
        let datagrams = self.drivers[motor].init_datagrams();
        for datagram in datagrams.iter() {
            self.write_datagram(datagram).await?;
        }
        Ok(())
    }

    /// Read DRV_STATUS and GSTAT for one driver
    async fn poll(&mut self, motor: usize) -> Result<(DrvStatus, GStat), Tmc2209Error> {
        let request = self.drivers[motor].read_status_request();
        let drv = DrvStatus::from_register(self.read_register(request, reg::DRV_STATUS).await?);
        let request = self.drivers[motor].read_gstat_request();
        let gstat = GStat::from_register(self.read_register(request, reg::GSTAT).await?);
        Ok((drv, gstat))
    }

    async fn handle(&mut self, command: TmcCommand) -> Result<(), Tmc2209Error> {
        match command {
            TmcCommand::Apply { motor, action } => {
                let motor = motor as usize;
                if motor >= MOTOR_COUNT {
                    return Ok(());
                }
                let datagram = self.drivers[motor].fail_safe_datagram(action);
                self.write_datagram(&datagram).await?;
                match action {
                    // Freewheel: driver stage off as well
                    FailSafeAction::MotorHiZ => self.enable[motor].set_high(),
                    // Stopped motors hold position with the coils energized
                    FailSafeAction::MotorStop
                    | FailSafeAction::MotorHold
                    | FailSafeAction::SystemReset => self.enable[motor].set_low(),
                }
                info!("Motor {} fail-safe {:?}", motor, action);
            }
            TmcCommand::Release { motor } => {
                let motor = motor as usize;
                if motor >= MOTOR_COUNT {
                    return Ok(());
                }
                let datagrams = self.drivers[motor].release_datagrams();
                for datagram in datagrams.iter() {
                    self.write_datagram(datagram).await?;
                }
                self.enable[motor].set_low();
                info!("Motor {} released", motor);
            }
            TmcCommand::Derate { motor, on } => {
                let motor = motor as usize;
                if motor >= MOTOR_COUNT {
                    return Ok(());
                }
                let datagram = self.drivers[motor].derate_datagram(on);
                self.write_datagram(&datagram).await?;
            }
            TmcCommand::Reinit { motor } => {
                let motor = motor as usize;
                if motor >= MOTOR_COUNT {
                    return Ok(());
                }
                info!("Motor {} driver re-initializing", motor);
                self.configure(motor).await?;
            }
        }
        Ok(())
    }
}

/// TMC2209 task
///
/// `channel` is the index of the `tmc` link in the safety configuration;
/// a poll in which every driver answered counts as activity on it.
#[embassy_executor::task]
pub async fn tmc_task(mut bus: TmcBus, channel: Option<u8>) {
    info!("TMC task starting...");

    // Wait for the drivers to power up
    Timer::after_millis(100).await;

    for motor in 0..MOTOR_COUNT {
        match bus.configure(motor).await {
            Ok(()) => {
                bus.enable[motor].set_low();
                info!("TMC2209 {} initialized", motor);
            }
            Err(e) => error!("TMC2209 {} init failed: {:?}", motor, e),
        }
    }

    let mut ticker = Ticker::every(Duration::from_millis(POLL_INTERVAL_MS));

    loop {
        match select(TMC_COMMANDS.receive(), ticker.next()).await {
            Either::First(command) => {
                if let Err(e) = bus.handle(command).await {
                    error!("TMC command {:?} failed: {:?}", command, e);
                }
            }
            Either::Second(()) => poll_all(&mut bus, channel).await,
        }
    }
}

async fn poll_all(bus: &mut TmcBus, channel: Option<u8>) {
    let mut answered = 0;
    for motor in 0..MOTOR_COUNT {
        match bus.poll(motor).await {
            Ok((drv, gstat)) => {
                answered += 1;
                publish_motor_status(motor as u8, combined_status(&drv, &gstat));

                // A reset flag means the chip lost its configuration;
                // configure() also clears GSTAT
                if gstat.reset {
                    warn!("TMC2209 {} reported a reset", motor);
                    if let Err(e) = bus.configure(motor).await {
                        warn!("TMC2209 {} reconfigure failed: {:?}", motor, e);
                    }
                }
            }
            Err(e) => debug!("TMC2209 {} poll failed: {:?}", motor, e),
        }
    }

    if answered == MOTOR_COUNT {
        if let Some(channel) = channel {
            record_channel_activity(channel, now_ms());
        }
    }
}
