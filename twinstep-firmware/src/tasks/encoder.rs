//! AS5600 polling tasks
//!
//! One task per I2C bus, each owning a single encoder. Samples are
//! published as read; a failed read publishes nothing, so the supervisor
//! sees the data go stale.

use defmt::*;
use embassy_rp::i2c::{Async, I2c};
use embassy_rp::peripherals::{I2C0, I2C1};
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal_async::i2c::I2c as AsyncI2c;

use twinstep_drivers::encoder::As5600;

use crate::channels::{now_ms, publish_encoder_sample, ENCODER_RESET};

/// Polling period, well inside the encoder sample timeout
const POLL_INTERVAL_MS: u64 = 5;

/// Settling time after a re-initialization request
const REINIT_DELAY_MS: u64 = 2;

/// Encoder 0 on I2C0
#[embassy_executor::task]
pub async fn encoder0_task(i2c: I2c<'static, I2C0, Async>) {
    run_encoder(0, As5600::new(i2c)).await
}

/// Encoder 1 on I2C1
#[embassy_executor::task]
pub async fn encoder1_task(i2c: I2c<'static, I2C1, Async>) {
    run_encoder(1, As5600::new(i2c)).await
}

async fn run_encoder<B: AsyncI2c>(id: u8, mut encoder: As5600<B>) -> ! {
    info!("Encoder {} task started", id);

    match encoder.read_status().await {
        Ok(status) if status.is_ok() => info!("Encoder {} magnet OK", id),
        Ok(status) => warn!(
            "Encoder {} magnet: detected={}, weak={}, strong={}",
            id, status.detected, status.too_weak, status.too_strong
        ),
        Err(_) => warn!("Encoder {} not responding", id),
    }

    let mut ticker = Ticker::every(Duration::from_millis(POLL_INTERVAL_MS));
    let mut failing = false;

    loop {
        ticker.next().await;

        if ENCODER_RESET[id as usize].try_take().is_some() {
            info!("Encoder {} re-initializing", id);
            publish_encoder_sample(id, None);
            Timer::after_millis(REINIT_DELAY_MS).await;
            ticker.reset();
            continue;
        }

        match encoder.read_sample(now_ms()).await {
            Ok(sample) => {
                if failing {
                    info!("Encoder {} reads recovered", id);
                    failing = false;
                }
                publish_encoder_sample(id, Some(sample));
            }
            Err(_) if !failing => {
                warn!("Encoder {} read failed", id);
                failing = true;
            }
            Err(_) => {}
        }
    }
}
