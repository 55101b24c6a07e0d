//! Emergency stop input task
//!
//! Watches the normally-closed E-stop loop (pulled up, low when pressed)
//! and sets the latch the supervisor drains on its next tick.

use defmt::*;
use embassy_rp::gpio::Input;
use embassy_time::Timer;

use crate::channels::ESTOP;

/// Contact bounce filter
const DEBOUNCE_MS: u64 = 20;

/// E-stop task
#[embassy_executor::task]
pub async fn estop_task(mut pin: Input<'static>) {
    info!("E-stop task started");

    // Pressed at power-up counts as a press
    if pin.is_low() {
        warn!("E-stop engaged at boot");
        ESTOP.trigger();
    }

    loop {
        pin.wait_for_falling_edge().await;
        warn!("E-stop pressed");
        ESTOP.trigger();

        Timer::after_millis(DEBOUNCE_MS).await;
        pin.wait_for_high().await;
        Timer::after_millis(DEBOUNCE_MS).await;
        debug!("E-stop released, awaiting acknowledge");
    }
}
