use embassy_time::{Instant, Timer};

use crate::net::MonotonicClock;

/// Monotonic clock backed by the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }

    async fn sleep_ms(&self, millis: u32) {
        Timer::after_millis(millis as u64).await;
    }

    async fn sleep_until_us(&self, deadline_us: u64) {
        Timer::at(Instant::from_micros(deadline_us)).await;
    }
}
