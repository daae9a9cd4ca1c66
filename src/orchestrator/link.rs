use crate::backoff::BackoffPolicy;
use crate::net::{LinkControl, MonotonicClock};
use crate::telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkVerdict {
    Healthy,
    Recovered { attempts: u32 },
    /// Every re-bring-up attempt in the budget failed.
    Exhausted,
}

impl LinkVerdict {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Recovered { .. } => "recovered",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Checks the interface flags and, if either is down, cycles the interface
/// up to `budget` times. Waits between attempts follow `policy` with a retry
/// state private to this call.
pub async fn supervise<L: LinkControl, C: MonotonicClock>(
    link: &mut L,
    clock: &C,
    policy: &BackoffPolicy,
    budget: u32,
) -> LinkVerdict {
    let admin_up = link.is_admin_up();
    let link_up = link.is_link_up();
    if admin_up && link_up {
        telemetry::record_link_up();
        return LinkVerdict::Healthy;
    }

    telemetry::record_link_down();
    log::warn!("link: down (admin_up={} link_up={})", admin_up, link_up);

    let mut retry = policy.initial_state();
    for attempt in 1..=budget {
        link.bring_down().await;
        if link.bring_up().await {
            telemetry::record_link_recovered();
            log::info!("link: recovered after {} attempt(s)", attempt);
            return LinkVerdict::Recovered { attempts: attempt };
        }

        telemetry::record_link_bring_up_failure();
        log::warn!("link: bring-up attempt {}/{} failed", attempt, budget);
        if attempt < budget {
            let delay_ms = policy.advance(&mut retry);
            clock.sleep_ms(delay_ms).await;
        }
    }

    log::error!("link: recovery budget of {} exhausted", budget);
    LinkVerdict::Exhausted
}
