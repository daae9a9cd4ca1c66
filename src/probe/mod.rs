//! ICMP echo probing: one raw socket per session, one outstanding probe at a
//! time, replies correlated by identifier only.

pub mod icmp;
mod stats;

#[cfg(test)]
mod tests;

use core::net::Ipv4Addr;

use embassy_futures::select::{select, Either};
use heapless::Vec;

use crate::config::{MeterConfig, MAX_PROBE_COUNT};
use crate::error::MeterError;
use crate::net::{parse_dotted_quad, IcmpSocket, IcmpStack, MonotonicClock};
use crate::telemetry;

use self::icmp::{classify_datagram, EchoHeader, ReplyVerdict};
pub use self::stats::{calculate_stats, loss_percent, ProbeStats};

/// Large enough for an IPv4 header with options plus the echo header.
const RECV_BUFFER_LEN: usize = 128;

/// Samples of one measurement cycle. `received` is the number of stored
/// samples; the last one is always the most recent reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSession {
    target: Ipv4Addr,
    capacity: u16,
    sent: u16,
    samples: Vec<u64, MAX_PROBE_COUNT>,
}

impl ProbeSession {
    pub fn new(target: Ipv4Addr, capacity: u16) -> Self {
        Self {
            target,
            capacity: capacity.min(MAX_PROBE_COUNT as u16),
            sent: 0,
            samples: Vec::new(),
        }
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn sent(&self) -> u16 {
        self.sent
    }

    pub fn received(&self) -> u16 {
        self.samples.len() as u16
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    pub fn loss_pct(&self) -> u8 {
        loss_percent(self.sent, self.received())
    }

    pub fn mark_sent(&mut self) -> Result<(), MeterError> {
        if self.sent >= self.capacity {
            return Err(MeterError::ResourceUnavailable);
        }
        self.sent += 1;
        Ok(())
    }

    pub fn record_reply(&mut self, rtt_us: u64) -> Result<(), MeterError> {
        if self.received() >= self.sent {
            return Err(MeterError::ResourceUnavailable);
        }
        self.samples
            .push(rtt_us)
            .map_err(|_| MeterError::ResourceUnavailable)
    }
}

/// Wait context for one outstanding probe. Only the reply handler writes it;
/// only the waiting loop reads it.
#[derive(Clone, Copy, Debug, Default)]
struct ReplyWait {
    done: bool,
    timestamp_ms: u32,
    discarded: u16,
}

impl ReplyWait {
    fn on_datagram(&mut self, datagram: &[u8]) {
        match classify_datagram(datagram) {
            ReplyVerdict::Matched {
                sequence,
                timestamp_ms,
            } => {
                log::trace!("probe: reply seq={}", sequence);
                self.done = true;
                self.timestamp_ms = timestamp_ms;
            }
            verdict => {
                if let Some(err) = verdict.error() {
                    log::trace!("probe: discarded datagram ({}: {})", err, verdict.as_str());
                }
                self.discarded = self.discarded.saturating_add(1);
                telemetry::record_probe_discarded();
            }
        }
    }
}

pub struct ProbeEngine<S> {
    stack: S,
    next_sequence: u16,
    probe_count: u16,
    timeout_ms: u32,
}

impl<S: IcmpStack> ProbeEngine<S> {
    pub fn new(stack: S, config: &MeterConfig) -> Self {
        Self {
            stack,
            next_sequence: 1,
            probe_count: config.probe_count.clamp(1, MAX_PROBE_COUNT as u16),
            timeout_ms: config.probe_timeout_ms,
        }
    }

    pub fn probe_count(&self) -> u16 {
        self.probe_count
    }

    /// Sequence number the next probe will carry.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Runs one session of `probe_count` probes against `target`.
    ///
    /// Fails with `InvalidAddress` before touching the stack, with
    /// `ResourceUnavailable` when no socket can be opened, and with `Timeout`
    /// when every probe went unanswered.
    pub async fn measure<C: MonotonicClock>(
        &mut self,
        clock: &C,
        target: &str,
    ) -> Result<ProbeSession, MeterError> {
        let target = parse_dotted_quad(target).inspect_err(|_| {
            log::warn!("probe: invalid target address {:?}", target);
        })?;

        let mut socket = self.stack.open().inspect_err(|err| {
            log::warn!("probe: socket unavailable ({})", err);
        })?;

        let mut session = ProbeSession::new(target, self.probe_count);
        for _ in 0..self.probe_count {
            let sequence = self.next_sequence;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            session.mark_sent()?;

            let request = EchoHeader::request(sequence, clock.now_ms() as u32);
            if let Err(err) = socket.send_to(target, &request.encode()).await {
                telemetry::record_probe_send_error();
                log::warn!("probe: send seq={} failed ({})", sequence, err);
                continue;
            }
            telemetry::record_probe_sent();

            match wait_for_reply(&mut socket, clock, self.timeout_ms).await {
                Some(wait) => {
                    let rtt_us = rtt_since(clock, wait.timestamp_ms);
                    session.record_reply(rtt_us)?;
                    telemetry::record_probe_reply();
                    log::debug!("probe: seq={} rtt={}us", sequence, rtt_us);
                }
                None => {
                    telemetry::record_probe_timeout();
                    log::debug!("probe: seq={} timed out", sequence);
                }
            }
        }
        drop(socket);

        log::info!(
            "probe: {} sent={} received={}",
            target,
            session.sent(),
            session.received()
        );
        if session.received() == 0 {
            telemetry::record_session_lost();
            return Err(MeterError::Timeout);
        }
        Ok(session)
    }
}

/// Feeds datagrams into a fresh wait context until a reply matches or the
/// probe timeout elapses.
async fn wait_for_reply<K: IcmpSocket, C: MonotonicClock>(
    socket: &mut K,
    clock: &C,
    timeout_ms: u32,
) -> Option<ReplyWait> {
    let deadline_us = clock.now_us() + timeout_ms as u64 * 1_000;
    let mut wait = ReplyWait::default();
    let mut buf = [0u8; RECV_BUFFER_LEN];

    while !wait.done {
        match select(socket.recv(&mut buf), clock.sleep_until_us(deadline_us)).await {
            Either::First(Ok(len)) => wait.on_datagram(&buf[..len.min(RECV_BUFFER_LEN)]),
            Either::First(Err(err)) => {
                log::warn!("probe: receive failed ({})", err);
                return None;
            }
            Either::Second(()) => {
                if wait.discarded > 0 {
                    log::debug!(
                        "probe: {} datagram(s) discarded before timeout",
                        wait.discarded
                    );
                }
                return None;
            }
        }
    }
    // A reply and the deadline can be ready in the same poll.
    let late_by_us = clock.now_us().saturating_sub(deadline_us);
    if late_by_us > 0 {
        log::debug!("probe: reply {}us past the deadline, dropped", late_by_us);
        return None;
    }
    Some(wait)
}

/// Microseconds elapsed since a 32-bit millisecond timestamp taken from the
/// same clock.
fn rtt_since<C: MonotonicClock>(clock: &C, timestamp_ms: u32) -> u64 {
    let now_us = clock.now_us();
    let now_ms = now_us / 1_000;
    let age_ms = (now_ms as u32).wrapping_sub(timestamp_ms) as u64;
    let sent_us = now_ms.saturating_sub(age_ms) * 1_000;
    now_us.saturating_sub(sent_us)
}
