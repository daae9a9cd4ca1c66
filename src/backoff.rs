use crate::config::MeterConfig;
use crate::telemetry;

/// Retry counter and current delay owned by one failure domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    pub count: u32,
    pub delay_ms: u32,
}

impl RetryState {
    pub const fn new(initial_delay_ms: u32) -> Self {
        Self {
            count: 0,
            delay_ms: initial_delay_ms,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay_ms: u32,
    pub max_delay_ms: u32,
    pub max_retry_count: u32,
    pub measurement_interval_ms: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &MeterConfig) -> Self {
        Self {
            initial_delay_ms: config.retry_delay_ms,
            max_delay_ms: config.retry_delay_max_ms,
            max_retry_count: config.retry_max,
            measurement_interval_ms: config.measurement_interval_ms,
        }
    }

    pub const fn initial_state(&self) -> RetryState {
        RetryState::new(self.initial_delay_ms)
    }

    /// Ceiling for any single backoff delay.
    pub const fn ceiling_ms(&self) -> u32 {
        let interval_cap = self.measurement_interval_ms.saturating_mul(4);
        if self.max_delay_ms < interval_cap {
            self.max_delay_ms
        } else {
            interval_cap
        }
    }

    pub fn reset(&self, state: &mut RetryState) {
        *state = self.initial_state();
    }

    /// Counts one more failure and returns how long to wait before the next
    /// attempt. Past `max_retry_count` the state is reset and the regular
    /// measurement interval is returned instead of a backoff value.
    pub fn advance(&self, state: &mut RetryState) -> u32 {
        state.count = state.count.saturating_add(1);
        telemetry::record_backoff_advance();

        if state.count > self.max_retry_count {
            log::warn!(
                "backoff: max retries reached ({}), resetting",
                self.max_retry_count
            );
            self.reset(state);
            return self.measurement_interval_ms;
        }

        let factor = 1u32.checked_shl(state.count - 1).unwrap_or(u32::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        state.delay_ms = delay.min(self.ceiling_ms());
        log::debug!(
            "backoff: delay={}ms retry={}/{}",
            state.delay_ms,
            state.count,
            self.max_retry_count
        );
        state.delay_ms
    }
}
