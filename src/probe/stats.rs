use crate::error::MeterError;

use super::ProbeSession;

/// Reduction of one session's samples. All RTT values in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeStats {
    pub rtt_avg_us: u64,
    pub rtt_min_us: u64,
    pub rtt_max_us: u64,
    pub jitter_us: u64,
    pub loss_pct: u8,
}

/// Loss as an integer percentage, truncated. An empty session counts as
/// total loss.
pub fn loss_percent(sent: u16, received: u16) -> u8 {
    if sent == 0 || received == 0 {
        return 100;
    }
    let lost = sent.saturating_sub(received) as u32;
    (lost * 100 / sent as u32) as u8
}

pub fn calculate_stats(session: &ProbeSession) -> Result<ProbeStats, MeterError> {
    let samples = session.samples();
    let (Some(&first), false) = (samples.first(), session.received() == 0) else {
        return Err(MeterError::AllLost);
    };

    let mut sum = 0u64;
    let mut min = first;
    let mut max = first;
    for &rtt in samples {
        sum = sum.saturating_add(rtt);
        min = min.min(rtt);
        max = max.max(rtt);
    }
    let rtt_avg_us = sum / samples.len() as u64;

    Ok(ProbeStats {
        rtt_avg_us,
        rtt_min_us: min,
        rtt_max_us: max,
        jitter_us: max - min,
        loss_pct: loss_percent(session.sent(), session.received()),
    })
}
