//! Build-time configuration.
//!
//! Every tunable has a built-in default that can be overridden at compile
//! time through an environment variable (`METER_*`), the same way Wi-Fi
//! credentials are baked into the image. Values are clamped by
//! [`MeterConfig::sanitized`] before use.

pub const MAX_PROBE_COUNT: usize = 16;
pub const DEFAULT_PROBE_COUNT: u16 = 5;
pub const DEFAULT_PROBE_TIMEOUT_MS: u32 = 1_000;
pub const DEFAULT_MEASUREMENT_INTERVAL_MS: u32 = 60_000;
pub const DEFAULT_RETRY_DELAY_MS: u32 = 5_000;
pub const DEFAULT_RETRY_MAX: u32 = 5;
pub const DEFAULT_LINK_RETRY_BUDGET: u32 = 5;
pub const DEFAULT_INFLUX_PORT: u16 = 8086;
pub const HTTP_EXCHANGE_TIMEOUT_MS: u32 = 5_000;
pub const HOST_TAG_MAX: usize = 32;

const DEFAULT_GATEWAY_IP: &str = "192.168.1.1";
const DEFAULT_INFLUX_IP: &str = "192.168.1.10";
const DEFAULT_INFLUX_ORG: &str = "home";
const DEFAULT_INFLUX_BUCKET: &str = "wifi";
const DEFAULT_INFLUX_TOKEN: &str = "";
const DEFAULT_HOST_TAG: &str = "esp32";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeterConfig {
    pub gateway_ip: &'static str,
    pub probe_count: u16,
    pub probe_timeout_ms: u32,
    pub measurement_interval_ms: u32,
    pub influx_ip: &'static str,
    pub influx_port: u16,
    pub influx_org: &'static str,
    pub influx_bucket: &'static str,
    pub influx_token: &'static str,
    pub host_tag: &'static str,
    pub retry_delay_ms: u32,
    pub retry_delay_max_ms: u32,
    pub retry_max: u32,
    pub link_retry_budget: u32,
}

impl MeterConfig {
    pub const fn defaults() -> Self {
        Self {
            gateway_ip: DEFAULT_GATEWAY_IP,
            probe_count: DEFAULT_PROBE_COUNT,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            measurement_interval_ms: DEFAULT_MEASUREMENT_INTERVAL_MS,
            influx_ip: DEFAULT_INFLUX_IP,
            influx_port: DEFAULT_INFLUX_PORT,
            influx_org: DEFAULT_INFLUX_ORG,
            influx_bucket: DEFAULT_INFLUX_BUCKET,
            influx_token: DEFAULT_INFLUX_TOKEN,
            host_tag: DEFAULT_HOST_TAG,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_delay_max_ms: DEFAULT_MEASUREMENT_INTERVAL_MS * 4,
            retry_max: DEFAULT_RETRY_MAX,
            link_retry_budget: DEFAULT_LINK_RETRY_BUDGET,
        }
    }

    /// Defaults with compile-time `METER_*` overrides applied, sanitized.
    pub fn from_env() -> Self {
        let defaults = Self::defaults();
        Self {
            gateway_ip: option_env!("METER_GATEWAY_IP").unwrap_or(defaults.gateway_ip),
            probe_count: env_u16(option_env!("METER_PROBE_COUNT"), defaults.probe_count),
            probe_timeout_ms: env_u32(
                option_env!("METER_PROBE_TIMEOUT_MS"),
                defaults.probe_timeout_ms,
            ),
            measurement_interval_ms: env_u32(
                option_env!("METER_INTERVAL_MS"),
                defaults.measurement_interval_ms,
            ),
            influx_ip: option_env!("METER_INFLUX_IP").unwrap_or(defaults.influx_ip),
            influx_port: env_u16(option_env!("METER_INFLUX_PORT"), defaults.influx_port),
            influx_org: option_env!("METER_INFLUX_ORG").unwrap_or(defaults.influx_org),
            influx_bucket: option_env!("METER_INFLUX_BUCKET").unwrap_or(defaults.influx_bucket),
            influx_token: option_env!("METER_INFLUX_TOKEN").unwrap_or(defaults.influx_token),
            host_tag: option_env!("METER_HOST_TAG").unwrap_or(defaults.host_tag),
            retry_delay_ms: env_u32(option_env!("METER_RETRY_DELAY_MS"), defaults.retry_delay_ms),
            retry_delay_max_ms: env_u32(
                option_env!("METER_RETRY_DELAY_MAX_MS"),
                defaults.retry_delay_max_ms,
            ),
            retry_max: env_u32(option_env!("METER_RETRY_MAX"), defaults.retry_max),
            link_retry_budget: env_u32(
                option_env!("METER_LINK_RETRY_BUDGET"),
                defaults.link_retry_budget,
            ),
        }
        .sanitized()
    }

    pub const fn sanitized(self) -> Self {
        let probe_count = clamp_u16(self.probe_count, 1, MAX_PROBE_COUNT as u16);
        let probe_timeout_ms = clamp_u32(self.probe_timeout_ms, 100, 10_000);
        let measurement_interval_ms = clamp_u32(self.measurement_interval_ms, 1_000, 3_600_000);
        let retry_delay_ms = clamp_u32(self.retry_delay_ms, 100, measurement_interval_ms);
        let mut retry_delay_max_ms = self.retry_delay_max_ms;
        if retry_delay_max_ms < retry_delay_ms {
            retry_delay_max_ms = retry_delay_ms;
        }
        let retry_max = clamp_u32(self.retry_max, 1, 16);
        let link_retry_budget = clamp_u32(self.link_retry_budget, 1, 32);
        let host_tag = if self.host_tag.is_empty() || self.host_tag.len() > HOST_TAG_MAX {
            DEFAULT_HOST_TAG
        } else {
            self.host_tag
        };
        Self {
            gateway_ip: self.gateway_ip,
            probe_count,
            probe_timeout_ms,
            measurement_interval_ms,
            influx_ip: self.influx_ip,
            influx_port: self.influx_port,
            influx_org: self.influx_org,
            influx_bucket: self.influx_bucket,
            influx_token: self.influx_token,
            host_tag,
            retry_delay_ms,
            retry_delay_max_ms,
            retry_max,
            link_retry_budget,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Station credentials baked in at build time.
pub fn wifi_credentials() -> Option<(&'static str, &'static str)> {
    let ssid = option_env!("METER_WIFI_SSID").or(option_env!("SSID"))?;
    let password = option_env!("METER_WIFI_PASSWORD")
        .or(option_env!("PASSWORD"))
        .unwrap_or("");
    Some((ssid, password))
}

fn env_u32(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u16(raw: Option<&str>, default: u16) -> u16 {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

const fn clamp_u32(value: u32, min: u32, max: u32) -> u32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

const fn clamp_u16(value: u16, min: u16, max: u16) -> u16 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
