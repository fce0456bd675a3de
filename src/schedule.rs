use chrono::{Datelike, Local};
use std::time::Duration;

/// Source of the current day-of-month.
pub trait Clock {
    fn today(&self) -> u32;
}

/// Local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> u32 {
        Local::now().day()
    }
}

/// Waits between poll cycles.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub fn measurement_interval(measurement_period_minutes: u64) -> Duration {
    Duration::from_secs(measurement_period_minutes.max(1).saturating_mul(60))
}
