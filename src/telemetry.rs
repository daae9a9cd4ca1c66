use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::MeterError;

static PROBES_SENT: AtomicU32 = AtomicU32::new(0);
static PROBE_SEND_ERRORS: AtomicU32 = AtomicU32::new(0);
static PROBE_REPLIES: AtomicU32 = AtomicU32::new(0);
static PROBE_TIMEOUTS: AtomicU32 = AtomicU32::new(0);
static PROBE_DISCARDED: AtomicU32 = AtomicU32::new(0);
static PROBE_SESSIONS_LOST: AtomicU32 = AtomicU32::new(0);
static LAST_RTT_AVG_US: AtomicU32 = AtomicU32::new(0);
static LAST_LOSS_PCT: AtomicU32 = AtomicU32::new(0);
static REPORTS_OK: AtomicU32 = AtomicU32::new(0);
static REPORTS_FAILED: AtomicU32 = AtomicU32::new(0);
static REPORT_TIMEOUTS: AtomicU32 = AtomicU32::new(0);
static REPORT_REJECTED: AtomicU32 = AtomicU32::new(0);
static REPORT_TRANSPORT_ERRORS: AtomicU32 = AtomicU32::new(0);
static BACKOFF_ADVANCES: AtomicU32 = AtomicU32::new(0);
static LINK_DOWN_EVENTS: AtomicU32 = AtomicU32::new(0);
static LINK_RECOVERIES: AtomicU32 = AtomicU32::new(0);
static LINK_BRING_UP_FAILURES: AtomicU32 = AtomicU32::new(0);
static DEVICE_RESETS: AtomicU32 = AtomicU32::new(0);
static LINK_UP: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    pub probes_sent: u32,
    pub probe_send_errors: u32,
    pub probe_replies: u32,
    pub probe_timeouts: u32,
    pub probe_discarded: u32,
    pub probe_sessions_lost: u32,
    pub last_rtt_avg_us: u32,
    pub last_loss_pct: u32,
    pub reports_ok: u32,
    pub reports_failed: u32,
    pub report_timeouts: u32,
    pub report_rejected: u32,
    pub report_transport_errors: u32,
    pub backoff_advances: u32,
    pub link_down_events: u32,
    pub link_recoveries: u32,
    pub link_bring_up_failures: u32,
    pub device_resets: u32,
    pub link_up: bool,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        probes_sent: PROBES_SENT.load(Ordering::Relaxed),
        probe_send_errors: PROBE_SEND_ERRORS.load(Ordering::Relaxed),
        probe_replies: PROBE_REPLIES.load(Ordering::Relaxed),
        probe_timeouts: PROBE_TIMEOUTS.load(Ordering::Relaxed),
        probe_discarded: PROBE_DISCARDED.load(Ordering::Relaxed),
        probe_sessions_lost: PROBE_SESSIONS_LOST.load(Ordering::Relaxed),
        last_rtt_avg_us: LAST_RTT_AVG_US.load(Ordering::Relaxed),
        last_loss_pct: LAST_LOSS_PCT.load(Ordering::Relaxed),
        reports_ok: REPORTS_OK.load(Ordering::Relaxed),
        reports_failed: REPORTS_FAILED.load(Ordering::Relaxed),
        report_timeouts: REPORT_TIMEOUTS.load(Ordering::Relaxed),
        report_rejected: REPORT_REJECTED.load(Ordering::Relaxed),
        report_transport_errors: REPORT_TRANSPORT_ERRORS.load(Ordering::Relaxed),
        backoff_advances: BACKOFF_ADVANCES.load(Ordering::Relaxed),
        link_down_events: LINK_DOWN_EVENTS.load(Ordering::Relaxed),
        link_recoveries: LINK_RECOVERIES.load(Ordering::Relaxed),
        link_bring_up_failures: LINK_BRING_UP_FAILURES.load(Ordering::Relaxed),
        device_resets: DEVICE_RESETS.load(Ordering::Relaxed),
        link_up: LINK_UP.load(Ordering::Relaxed),
    }
}

pub(crate) fn record_probe_sent() {
    PROBES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_send_error() {
    PROBE_SEND_ERRORS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_reply() {
    PROBE_REPLIES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_timeout() {
    PROBE_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_probe_discarded() {
    PROBE_DISCARDED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_session_lost() {
    PROBE_SESSIONS_LOST.fetch_add(1, Ordering::Relaxed);
    LAST_LOSS_PCT.store(100, Ordering::Relaxed);
}

pub(crate) fn record_session_stats(rtt_avg_us: u64, loss_pct: u8) {
    LAST_RTT_AVG_US.store(saturate_u32(rtt_avg_us), Ordering::Relaxed);
    LAST_LOSS_PCT.store(loss_pct as u32, Ordering::Relaxed);
}

pub(crate) fn record_report_ok() {
    REPORTS_OK.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_report_failure(error: MeterError) {
    REPORTS_FAILED.fetch_add(1, Ordering::Relaxed);
    match error {
        MeterError::Timeout => {
            REPORT_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
        }
        MeterError::RemoteRejected => {
            REPORT_REJECTED.fetch_add(1, Ordering::Relaxed);
        }
        MeterError::TransportError | MeterError::ResourceUnavailable => {
            REPORT_TRANSPORT_ERRORS.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}

pub(crate) fn record_backoff_advance() {
    BACKOFF_ADVANCES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_link_down() {
    LINK_DOWN_EVENTS.fetch_add(1, Ordering::Relaxed);
    LINK_UP.store(false, Ordering::Relaxed);
}

pub(crate) fn record_link_up() {
    LINK_UP.store(true, Ordering::Relaxed);
}

pub(crate) fn record_link_recovered() {
    LINK_RECOVERIES.fetch_add(1, Ordering::Relaxed);
    LINK_UP.store(true, Ordering::Relaxed);
}

pub(crate) fn record_link_bring_up_failure() {
    LINK_BRING_UP_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_device_reset() {
    DEVICE_RESETS.fetch_add(1, Ordering::Relaxed);
}

fn saturate_u32(value: u64) -> u32 {
    if value > u32::MAX as u64 {
        u32::MAX
    } else {
        value as u32
    }
}
