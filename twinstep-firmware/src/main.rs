//! Twinstep - dual-stepper safety firmware
//!
//! Main firmware binary for RP2040 boards driving two TMC2209 stepper
//! drivers with AS5600 magnetic encoders on the output shafts. The safety
//! supervisor from twinstep-core runs in its own task; everything else
//! exists to feed it readings and carry out its decisions.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::{I2C0, I2C1, UART0, UART1};
use embassy_rp::uart::{
    BufferedInterruptHandler, Config as UartConfig, InterruptHandler as UartInterruptHandler, Uart,
};
use embassy_rp::watchdog::Watchdog;
use embassy_time::Duration;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use twinstep_core::safety::SafetySupervisor;
use twinstep_drivers::stepper::Tmc2209Config;

use crate::board::{Board, ChannelMap};
use crate::channels::now_ms;
use crate::config::load_safety_config;

mod board;
mod channels;
mod config;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
    UART1_IRQ => UartInterruptHandler<UART1>;
    I2C0_IRQ => i2c::InterruptHandler<I2C0>;
    I2C1_IRQ => i2c::InterruptHandler<I2C1>;
});

// Host link UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 128]> = StaticCell::new();

/// Encoder bus speed
const I2C_FREQUENCY_HZ: u32 = 400_000;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Twinstep firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config = load_safety_config();
    let channels = ChannelMap {
        host: config.find_channel("host"),
        ui: config.find_channel("ui"),
        tmc: config.find_channel("tmc"),
    };

    // Started before anything else can stall; the supervisor feeds it
    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.pause_on_debug(true);
    watchdog.start(Duration::from_millis(config.watchdog_timeout_ms as u64));
    info!("Watchdog armed: {} ms", config.watchdog_timeout_ms);

    let supervisor = unwrap!(SafetySupervisor::new(config, now_ms()));
    let board = Board::new(watchdog, channels);

    // Host link on UART0
    // Pin assignments are board-specific (SKR Pico: GPIO0 TX, GPIO1 RX)
    let tx_buf = TX_BUF.init([0u8; 128]);
    let rx_buf = RX_BUF.init([0u8; 128]);
    let host_uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, UartConfig::default())
        .into_buffered(Irqs, tx_buf, rx_buf);
    info!("Host UART initialized");

    // TMC2209 single-wire bus on UART1 (SKR Pico: GPIO8 TX, GPIO9 RX)
    let tmc_uart = Uart::new(
        p.UART1,
        p.PIN_8,
        p.PIN_9,
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        UartConfig::default(),
    );
    let tmc_configs = [
        Tmc2209Config {
            uart_address: 0,
            ..Default::default()
        },
        Tmc2209Config {
            uart_address: 1,
            ..Default::default()
        },
    ];
    // Enable lines are active low; start with both drivers off
    let enable = [
        Output::new(p.PIN_12, Level::High),
        Output::new(p.PIN_7, Level::High),
    ];
    let tmc_bus = tasks::TmcBus::new(tmc_uart, tmc_configs, enable);
    info!("TMC UART initialized");

    // One AS5600 per I2C bus (fixed address)
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = I2C_FREQUENCY_HZ;
    let i2c0 = I2c::new_async(p.I2C0, p.PIN_21, p.PIN_20, Irqs, i2c_config.clone());
    let i2c1 = I2c::new_async(p.I2C1, p.PIN_27, p.PIN_26, Irqs, i2c_config);
    info!("Encoder buses initialized");

    // E-stop loop, low when pressed
    let estop = Input::new(p.PIN_4, Pull::Up);

    // Spawn tasks
    spawner.spawn(tasks::estop_task(estop)).unwrap();
    spawner.spawn(tasks::tmc_task(tmc_bus, channels.tmc)).unwrap();
    spawner.spawn(tasks::encoder0_task(i2c0)).unwrap();
    spawner.spawn(tasks::encoder1_task(i2c1)).unwrap();
    spawner
        .spawn(tasks::host_task(host_uart, channels.host, channels.ui))
        .unwrap();
    spawner.spawn(tasks::supervisor_task(supervisor, board)).unwrap();

    info!("All tasks spawned, firmware running");
}
