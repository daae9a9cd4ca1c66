//! The measurement loop: probe, report, check the link, sleep.

mod engine;
mod link;
mod machine;


use crate::backoff::{BackoffPolicy, RetryState};
use crate::config::MeterConfig;
use crate::net::{
    DeviceControl, IcmpStack, LinkControl, MonotonicClock, StreamStack, TemperatureSensor,
};
use crate::probe::{calculate_stats, ProbeEngine, ProbeStats};
use crate::report::Reporter;
use crate::telemetry;

pub use self::engine::{CycleApplyResult, CycleEngine};
pub use self::link::{supervise, LinkVerdict};
pub use self::machine::{CycleApplyStatus, CycleEvent, CyclePhase};

/// What one pass through the loop did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleOutcome {
    pub stats: Option<ProbeStats>,
    pub temperature_c: f32,
    pub reported: bool,
    pub sleep_ms: u32,
    pub link: LinkVerdict,
}

impl CycleOutcome {
    pub fn halted(&self) -> bool {
        matches!(self.link, LinkVerdict::Exhausted)
    }
}

/// Platform pieces the loop drives.
pub struct MeterIo<I, S, T, L, D, C> {
    pub icmp: I,
    pub stream: S,
    pub sensor: T,
    pub link: L,
    pub device: D,
    pub clock: C,
}

pub struct Meter<I, S, T, L, D, C> {
    config: MeterConfig,
    probe: ProbeEngine<I>,
    reporter: Reporter<S>,
    sensor: T,
    link: L,
    device: D,
    clock: C,
    backoff: BackoffPolicy,
    report_retry: RetryState,
    engine: CycleEngine,
}

impl<I, S, T, L, D, C> Meter<I, S, T, L, D, C>
where
    I: IcmpStack,
    S: StreamStack,
    T: TemperatureSensor,
    L: LinkControl,
    D: DeviceControl,
    C: MonotonicClock,
{
    pub fn new(config: MeterConfig, io: MeterIo<I, S, T, L, D, C>) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self {
            probe: ProbeEngine::new(io.icmp, &config),
            reporter: Reporter::new(io.stream, &config),
            sensor: io.sensor,
            link: io.link,
            device: io.device,
            clock: io.clock,
            report_retry: backoff.initial_state(),
            engine: CycleEngine::new(config.measurement_interval_ms),
            backoff,
            config,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.engine.phase()
    }

    pub fn report_retry(&self) -> RetryState {
        self.report_retry
    }

    /// Runs cycles until link recovery gives up and the device reset returns
    /// control, which only happens off target.
    pub async fn run(&mut self) {
        log::info!(
            "meter: gateway={} interval={}ms probes={}",
            self.config.gateway_ip,
            self.config.measurement_interval_ms,
            self.probe.probe_count()
        );
        loop {
            if self.run_cycle().await.halted() {
                return;
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        // Probing
        let temperature_c = self.sensor.read_celsius();
        let stats = match self.probe.measure(&self.clock, self.config.gateway_ip).await {
            Ok(session) => calculate_stats(&session).ok(),
            Err(err) => {
                log::warn!("meter: measurement failed ({})", err);
                None
            }
        };
        if let Some(stats) = stats {
            telemetry::record_session_stats(stats.rtt_avg_us, stats.loss_pct);
        }
        self.engine.apply(CycleEvent::ProbeFinished {
            measured: stats.is_some(),
        });

        // Reporting
        let reported = match &stats {
            Some(stats) => {
                self.reporter
                    .send_measurement(&self.clock, stats, temperature_c)
                    .await
            }
            None => self.reporter.send_failure(&self.clock, temperature_c).await,
        };
        let sleep_ms = if reported {
            self.backoff.reset(&mut self.report_retry);
            self.config.measurement_interval_ms
        } else {
            self.backoff.advance(&mut self.report_retry)
        };
        self.engine.apply(CycleEvent::ReportFinished {
            accepted: reported,
            sleep_ms,
        });

        // LinkCheck
        let link = supervise(
            &mut self.link,
            &self.clock,
            &self.backoff,
            self.config.link_retry_budget,
        )
        .await;
        let outcome = CycleOutcome {
            stats,
            temperature_c,
            reported,
            sleep_ms,
            link,
        };
        if outcome.halted() {
            self.engine.apply(CycleEvent::LinkExhausted);
            telemetry::record_device_reset();
            log::error!("meter: link unrecoverable, resetting device");
            self.device.reset();
            return outcome;
        }
        self.engine.apply(CycleEvent::LinkHealthy);

        // Sleeping
        log::info!(
            "meter: cycle done measured={} reported={} link={} sleep={}ms",
            stats.is_some(),
            reported,
            link.as_str(),
            sleep_ms
        );
        let counters = telemetry::snapshot();
        log::debug!(
            "meter: counters probes={}/{} discarded={} reports={}/{} link_recoveries={}",
            counters.probe_replies,
            counters.probes_sent,
            counters.probe_discarded,
            counters.reports_ok,
            counters.reports_ok + counters.reports_failed,
            counters.link_recoveries
        );
        self.clock.sleep_ms(sleep_ms).await;
        self.engine.apply(CycleEvent::SleepElapsed);
        outcome
    }
}
