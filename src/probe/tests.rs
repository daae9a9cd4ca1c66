use core::net::Ipv4Addr;

use embassy_futures::block_on;

use crate::config::MeterConfig;
use crate::error::MeterError;
use crate::net::MonotonicClock;
use crate::testing::{FakeClock, FakeIcmpStack, FakeProbe, START_US};

use super::icmp::{ECHO_IDENTIFIER, ICMP_ECHO_REQUEST};
use super::{calculate_stats, ProbeEngine, ProbeSession};

const GATEWAY: &str = "192.168.1.1";

fn engine_with(probe_count: u16) -> (FakeClock, FakeIcmpStack, ProbeEngine<FakeIcmpStack>) {
    let clock = FakeClock::new();
    let stack = FakeIcmpStack::new(&clock);
    let config = MeterConfig {
        probe_count,
        probe_timeout_ms: 1_000,
        ..MeterConfig::defaults()
    };
    let engine = ProbeEngine::new(stack.clone(), &config);
    (clock, stack, engine)
}

fn reply(latency_us: u64) -> FakeProbe {
    FakeProbe::Reply { latency_us }
}

#[test]
fn all_replies_matched_gives_zero_loss() {
    let (clock, stack, mut engine) = engine_with(5);
    stack.script(&[
        reply(1_000),
        reply(2_000),
        reply(4_000),
        reply(3_000),
        reply(2_000),
    ]);

    let session = block_on(engine.measure(&clock, GATEWAY)).unwrap();
    assert_eq!(session.target(), Ipv4Addr::new(192, 168, 1, 1));
    assert_eq!(session.sent(), 5);
    assert_eq!(session.received(), 5);
    assert_eq!(session.samples(), &[1_000, 2_000, 4_000, 3_000, 2_000]);

    let stats = calculate_stats(&session).unwrap();
    assert_eq!(stats.loss_pct, 0);
    assert_eq!(stats.rtt_min_us, 1_000);
    assert_eq!(stats.rtt_max_us, 4_000);
    assert_eq!(stats.jitter_us, 3_000);
    assert_eq!(stats.rtt_avg_us, 2_400);
}

#[test]
fn silent_gateway_fails_after_every_probe_times_out() {
    let (clock, stack, mut engine) = engine_with(5);
    stack.script(&[FakeProbe::Lost; 5]);

    let result = block_on(engine.measure(&clock, GATEWAY));
    assert_eq!(result, Err(MeterError::Timeout));
    assert_eq!(stack.requests().len(), 5);
    assert_eq!(clock.now_us(), START_US + 5 * 1_000_000);
    assert_eq!(stack.opened(), 1);
    assert_eq!(stack.released(), 1);
}

#[test]
fn malformed_target_never_touches_the_stack() {
    let (clock, stack, mut engine) = engine_with(5);
    for target in ["192.168.2", "192.168.2.1.1", "gateway", "300.1.1.1"] {
        let result = block_on(engine.measure(&clock, target));
        assert_eq!(result, Err(MeterError::InvalidAddress), "{target}");
    }
    assert_eq!(stack.opened(), 0);
    assert!(stack.requests().is_empty());
    assert_eq!(engine.next_sequence(), 1);
}

#[test]
fn unavailable_socket_is_reported() {
    let (clock, stack, mut engine) = engine_with(3);
    stack.fail_open();
    let result = block_on(engine.measure(&clock, GATEWAY));
    assert_eq!(result, Err(MeterError::ResourceUnavailable));
    assert!(stack.requests().is_empty());
}

#[test]
fn requests_carry_sentinel_and_monotonic_sequence_across_sessions() {
    let (clock, stack, mut engine) = engine_with(3);
    stack.script(&[reply(1_000); 6]);

    block_on(engine.measure(&clock, GATEWAY)).unwrap();
    block_on(engine.measure(&clock, GATEWAY)).unwrap();

    let requests = stack.requests();
    let sequences: std::vec::Vec<u16> =
        requests.iter().map(|(_, header)| header.sequence).collect();
    assert_eq!(sequences, std::vec![1, 2, 3, 4, 5, 6]);
    for (dest, header) in &requests {
        assert_eq!(*dest, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(header.kind, ICMP_ECHO_REQUEST);
        assert_eq!(header.identifier, ECHO_IDENTIFIER);
        assert_eq!(header.computed_checksum(), header.checksum);
    }
    assert_eq!(engine.next_sequence(), 7);
    assert_eq!(stack.opened(), 2);
    assert_eq!(stack.released(), 2);
}

#[test]
fn timestamps_follow_the_millisecond_clock() {
    let (clock, stack, mut engine) = engine_with(2);
    stack.script(&[reply(3_000), reply(1_000)]);

    block_on(engine.measure(&clock, GATEWAY)).unwrap();
    let requests = stack.requests();
    assert_eq!(requests[0].1.timestamp_ms, (START_US / 1_000) as u32);
    assert_eq!(requests[1].1.timestamp_ms, (START_US / 1_000) as u32 + 3);
}

#[test]
fn reply_after_the_timeout_is_not_a_sample() {
    let (clock, stack, mut engine) = engine_with(1);
    stack.script(&[reply(2_500_000)]);

    let result = block_on(engine.measure(&clock, GATEWAY));
    assert_eq!(result, Err(MeterError::Timeout));
    assert_eq!(stack.released(), 1);
}

#[test]
fn reply_outside_the_window_waits_for_the_deadline() {
    let (clock, stack, mut engine) = engine_with(2);
    stack.reply_window_ms(1_000);
    stack.script(&[reply(2_500_000), reply(1_000)]);

    let session = block_on(engine.measure(&clock, GATEWAY)).unwrap();
    assert_eq!(session.received(), 1);
    assert_eq!(session.samples(), &[1_000]);
    assert_eq!(session.loss_pct(), 50);
    assert_eq!(clock.now_us(), START_US + 1_000_000 + 1_000);
}

#[test]
fn corrupted_and_foreign_datagrams_are_discarded() {
    let (clock, stack, mut engine) = engine_with(3);
    stack.script(&[
        FakeProbe::CorruptThenReply { latency_us: 2_000 },
        FakeProbe::Foreign { latency_us: 500 },
        reply(1_000),
    ]);

    let session = block_on(engine.measure(&clock, GATEWAY)).unwrap();
    assert_eq!(session.sent(), 3);
    assert_eq!(session.received(), 2);
    assert_eq!(session.samples(), &[2_000, 1_000]);
    assert_eq!(session.loss_pct(), 33);
}

#[test]
fn send_failure_still_counts_as_sent() {
    let (clock, stack, mut engine) = engine_with(2);
    stack.script(&[FakeProbe::SendError, reply(1_000)]);

    let session = block_on(engine.measure(&clock, GATEWAY)).unwrap();
    assert_eq!(session.sent(), 2);
    assert_eq!(session.received(), 1);
    assert_eq!(calculate_stats(&session).unwrap().loss_pct, 50);
    assert_eq!(stack.requests().len(), 1);
    assert_eq!(engine.next_sequence(), 3);
}

#[test]
fn duplicate_reply_satisfies_the_next_wait() {
    let (clock, stack, mut engine) = engine_with(2);
    stack.script(&[FakeProbe::Duplicate { latency_us: 2_000 }, FakeProbe::Lost]);

    let session = block_on(engine.measure(&clock, GATEWAY)).unwrap();
    assert_eq!(session.received(), 2);
    // The stale copy carries the first probe's timestamp.
    assert_eq!(session.samples(), &[2_000, 2_000]);
}

#[test]
fn session_rejects_more_replies_than_probes_sent() {
    let mut session = ProbeSession::new(Ipv4Addr::LOCALHOST, 2);
    assert_eq!(
        session.record_reply(10),
        Err(MeterError::ResourceUnavailable)
    );
    session.mark_sent().unwrap();
    session.record_reply(10).unwrap();
    assert_eq!(
        session.record_reply(11),
        Err(MeterError::ResourceUnavailable)
    );
    session.mark_sent().unwrap();
    assert_eq!(
        session.mark_sent(),
        Err(MeterError::ResourceUnavailable)
    );
    assert!(session.received() <= session.sent());
    assert!(session.sent() <= session.capacity());
}

#[test]
fn session_capacity_is_bounded_by_storage() {
    let session = ProbeSession::new(Ipv4Addr::LOCALHOST, 200);
    assert_eq!(session.capacity() as usize, crate::config::MAX_PROBE_COUNT);
}
