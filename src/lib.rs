#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod backoff;
pub mod config;
pub mod error;
#[cfg(feature = "firmware")]
pub mod firmware;
pub mod net;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod sensors;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::{BackoffPolicy, RetryState};
pub use config::MeterConfig;
pub use error::MeterError;
pub use orchestrator::{CycleOutcome, Meter, MeterIo};
pub use probe::{calculate_stats, ProbeEngine, ProbeSession, ProbeStats};
pub use report::{Reporter, TelemetryRecord};
