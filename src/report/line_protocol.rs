use core::fmt::{self, Write};

use heapless::String;

use crate::error::MeterError;
use crate::probe::ProbeStats;

pub const MEASUREMENT_NAME: &str = "wifi_measurements";
pub const LINE_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TelemetryRecord {
    Measurement {
        stats: ProbeStats,
        temperature_c: f32,
    },
    /// No probe was answered: loss is fixed at 100 and RTT fields are left out.
    Failure { temperature_c: f32 },
}

impl TelemetryRecord {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Measurement { .. } => "measurement",
            Self::Failure { .. } => "failure",
        }
    }

    pub fn write_line<W: Write>(&self, host_tag: &str, out: &mut W) -> fmt::Result {
        write!(out, "{},host={} ", MEASUREMENT_NAME, host_tag)?;
        match self {
            Self::Measurement {
                stats,
                temperature_c,
            } => write!(
                out,
                "rtt_avg={},rtt_min={},rtt_max={},jitter={},loss={},temperature={:.2}",
                stats.rtt_avg_us,
                stats.rtt_min_us,
                stats.rtt_max_us,
                stats.jitter_us,
                stats.loss_pct,
                temperature_c
            ),
            Self::Failure { temperature_c } => {
                write!(out, "loss=100,temperature={:.2}", temperature_c)
            }
        }
    }

    pub fn to_line(&self, host_tag: &str) -> Result<String<LINE_CAPACITY>, MeterError> {
        let mut line = String::new();
        self.write_line(host_tag, &mut line)
            .map_err(|_| MeterError::ResourceUnavailable)?;
        Ok(line)
    }
}
