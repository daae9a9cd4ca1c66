//! Delivery of measurement records to the time-series database.

mod http;
mod line_protocol;


use embassy_futures::select::{select, Either};

use crate::config::{MeterConfig, HTTP_EXCHANGE_TIMEOUT_MS};
use crate::error::MeterError;
use crate::net::{parse_dotted_quad, MonotonicClock, StreamConnection, StreamStack};
use crate::probe::ProbeStats;
use crate::telemetry;

pub use self::http::{
    build_request, classify_response, ExchangePhase, HttpExchange, WriteTarget,
    REQUEST_CAPACITY, RESPONSE_CHUNK_LEN,
};
pub use self::line_protocol::{TelemetryRecord, LINE_CAPACITY, MEASUREMENT_NAME};

pub struct Reporter<S> {
    stack: S,
    host: &'static str,
    port: u16,
    org: &'static str,
    bucket: &'static str,
    token: &'static str,
    host_tag: &'static str,
}

impl<S: StreamStack> Reporter<S> {
    pub fn new(stack: S, config: &MeterConfig) -> Self {
        Self {
            stack,
            host: config.influx_ip,
            port: config.influx_port,
            org: config.influx_org,
            bucket: config.influx_bucket,
            token: config.influx_token,
            host_tag: config.host_tag,
        }
    }

    fn target(&self) -> WriteTarget<'static> {
        WriteTarget {
            host: self.host,
            port: self.port,
            org: self.org,
            bucket: self.bucket,
            token: self.token,
        }
    }

    pub async fn send_measurement<C: MonotonicClock>(
        &mut self,
        clock: &C,
        stats: &ProbeStats,
        temperature_c: f32,
    ) -> bool {
        let record = TelemetryRecord::Measurement {
            stats: *stats,
            temperature_c,
        };
        self.send(clock, &record).await
    }

    pub async fn send_failure<C: MonotonicClock>(
        &mut self,
        clock: &C,
        temperature_c: f32,
    ) -> bool {
        self.send(clock, &TelemetryRecord::Failure { temperature_c }).await
    }

    /// One attempt, no retry. Failures are logged and counted, then reported
    /// as `false`.
    pub async fn send<C: MonotonicClock>(&mut self, clock: &C, record: &TelemetryRecord) -> bool {
        match self.try_send(clock, record).await {
            Ok(()) => {
                telemetry::record_report_ok();
                log::info!("report: {} record accepted", record.kind());
                true
            }
            Err(err) => {
                telemetry::record_report_failure(err);
                log::warn!("report: {} record failed ({})", record.kind(), err);
                false
            }
        }
    }

    async fn try_send<C: MonotonicClock>(
        &mut self,
        clock: &C,
        record: &TelemetryRecord,
    ) -> Result<(), MeterError> {
        let remote = parse_dotted_quad(self.host)?;
        let line = record.to_line(self.host_tag)?;
        log::debug!("report: {}", line.as_str());
        let mut exchange = HttpExchange::new(build_request(&self.target(), &line)?);

        let port = self.port;
        let mut connection = self.stack.open()?;
        let deadline_us = clock.now_us() + HTTP_EXCHANGE_TIMEOUT_MS as u64 * 1_000;
        let mut forced = false;
        let result = match select(
            exchange.drive(&mut connection, remote, port),
            clock.sleep_until_us(deadline_us),
        )
        .await
        {
            Either::First(result) => result,
            Either::Second(()) => {
                log::warn!(
                    "report: no completion within {}ms while {}",
                    HTTP_EXCHANGE_TIMEOUT_MS,
                    exchange.phase().as_str()
                );
                forced = true;
                Err(MeterError::Timeout)
            }
        };
        connection.close(forced).await;
        match (exchange.is_complete(), exchange.is_success()) {
            (true, true) => Ok(()),
            (complete, _) => {
                log::debug!("report: exchange ended complete={}", complete);
                Err(result.err().unwrap_or(MeterError::RemoteRejected))
            }
        }
    }
}
