//! Scripted doubles for the platform seams. Every double is a cheap handle
//! over shared state so a test can keep one clone for inspection while the
//! code under test owns another.

use core::cell::{Cell, RefCell};
use core::net::Ipv4Addr;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::error::MeterError;
use crate::net::{
    DeviceControl, IcmpSocket, IcmpStack, LinkControl, MonotonicClock, StreamConnection,
    StreamStack, TemperatureSensor,
};
use crate::probe::icmp::{EchoHeader, ECHO_HEADER_LEN, ICMP_ECHO_REPLY};

pub const START_US: u64 = 1_000_000;

#[derive(Clone, Debug)]
pub struct FakeClock {
    now_us: Rc<Cell<u64>>,
    sleeps_ms: Rc<RefCell<Vec<u32>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now_us: Rc::new(Cell::new(START_US)),
            sleeps_ms: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn advance_us(&self, micros: u64) {
        self.now_us.set(self.now_us.get() + micros);
    }

    fn advance_to(&self, deadline_us: u64) {
        if deadline_us > self.now_us.get() {
            self.now_us.set(deadline_us);
        }
    }

    /// Durations passed to `sleep_ms`, oldest first.
    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps_ms.borrow().clone()
    }
}

impl MonotonicClock for FakeClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }

    async fn sleep_ms(&self, millis: u32) {
        self.sleeps_ms.borrow_mut().push(millis);
        self.advance_us(millis as u64 * 1_000);
    }

    async fn sleep_until_us(&self, deadline_us: u64) {
        self.advance_to(deadline_us);
    }
}

/// What the fake network does with one echo request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeProbe {
    Reply { latency_us: u64 },
    Lost,
    SendError,
    /// A corrupted copy of the reply arrives first, then the real one.
    CorruptThenReply { latency_us: u64 },
    /// A reply carrying another agent's identifier, then nothing.
    Foreign { latency_us: u64 },
    /// The reply arrives twice; the copy stays queued for the next wait.
    Duplicate { latency_us: u64 },
}

#[derive(Debug, Default)]
struct IcmpState {
    script: VecDeque<FakeProbe>,
    inbox: VecDeque<(u64, Vec<u8>)>,
    requests: Vec<(Ipv4Addr, EchoHeader)>,
    fail_open: bool,
    opened: u32,
    released: u32,
    reply_window_us: Option<u64>,
    window_closes_us: u64,
}

#[derive(Clone, Debug)]
pub struct FakeIcmpStack {
    clock: FakeClock,
    state: Rc<RefCell<IcmpState>>,
}

impl FakeIcmpStack {
    pub fn new(clock: &FakeClock) -> Self {
        Self {
            clock: clock.clone(),
            state: Rc::new(RefCell::new(IcmpState::default())),
        }
    }

    pub fn script(&self, probes: &[FakeProbe]) {
        self.state.borrow_mut().script.extend(probes.iter().copied());
    }

    pub fn fail_open(&self) {
        self.state.borrow_mut().fail_open = true;
    }

    /// Datagrams arriving later than this after the last request stay queued
    /// instead of being delivered to the current receive.
    pub fn reply_window_ms(&self, window_ms: u64) {
        self.state.borrow_mut().reply_window_us = Some(window_ms * 1_000);
    }

    pub fn opened(&self) -> u32 {
        self.state.borrow().opened
    }

    pub fn released(&self) -> u32 {
        self.state.borrow().released
    }

    pub fn requests(&self) -> Vec<(Ipv4Addr, EchoHeader)> {
        self.state.borrow().requests.clone()
    }
}

pub struct FakeIcmpSocket {
    clock: FakeClock,
    state: Rc<RefCell<IcmpState>>,
}

impl Drop for FakeIcmpSocket {
    fn drop(&mut self) {
        self.state.borrow_mut().released += 1;
    }
}

impl IcmpStack for FakeIcmpStack {
    type Socket<'a>
        = FakeIcmpSocket
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Socket<'_>, MeterError> {
        let mut state = self.state.borrow_mut();
        if state.fail_open {
            return Err(MeterError::ResourceUnavailable);
        }
        state.opened += 1;
        Ok(FakeIcmpSocket {
            clock: self.clock.clone(),
            state: self.state.clone(),
        })
    }
}

impl IcmpSocket for FakeIcmpSocket {
    async fn send_to(&mut self, dest: Ipv4Addr, message: &[u8]) -> Result<(), MeterError> {
        let mut state = self.state.borrow_mut();
        let request = EchoHeader::decode(message).ok_or(MeterError::TransportError)?;
        let now = self.clock.now_us();
        if let Some(window_us) = state.reply_window_us {
            state.window_closes_us = now + window_us;
        }
        match state.script.pop_front().unwrap_or(FakeProbe::Lost) {
            FakeProbe::SendError => return Err(MeterError::TransportError),
            FakeProbe::Lost => {}
            FakeProbe::Reply { latency_us } => {
                state.inbox.push_back((now + latency_us, echo_reply(&request, None)));
            }
            FakeProbe::CorruptThenReply { latency_us } => {
                let mut corrupt = echo_reply(&request, None);
                corrupt[20 + 6] ^= 0x01;
                state.inbox.push_back((now + latency_us / 2, corrupt));
                state.inbox.push_back((now + latency_us, echo_reply(&request, None)));
            }
            FakeProbe::Duplicate { latency_us } => {
                let reply = echo_reply(&request, None);
                state.inbox.push_back((now + latency_us, reply.clone()));
                state.inbox.push_back((now + latency_us, reply));
            }
            FakeProbe::Foreign { latency_us } => {
                state
                    .inbox
                    .push_back((now + latency_us, echo_reply(&request, Some(0x1234))));
            }
        }
        state.requests.push((dest, request));
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        let next = {
            let mut state = self.state.borrow_mut();
            let closes_us = state.reply_window_us.map(|_| state.window_closes_us);
            let earliest = state
                .inbox
                .iter()
                .enumerate()
                .min_by_key(|(_, (arrives_us, _))| *arrives_us)
                .map(|(index, (arrives_us, _))| (index, *arrives_us));
            match earliest {
                Some((_, arrives_us)) if closes_us.is_some_and(|closes| arrives_us > closes) => {
                    None
                }
                Some((index, _)) => state.inbox.remove(index),
                None => None,
            }
        };
        let Some((arrives_us, datagram)) = next else {
            return core::future::pending().await;
        };
        self.clock.advance_to(arrives_us);
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }
}

/// IPv4-wrapped echo reply mirroring `request`.
pub fn echo_reply(request: &EchoHeader, identifier: Option<u16>) -> Vec<u8> {
    let mut reply = *request;
    reply.kind = ICMP_ECHO_REPLY;
    if let Some(identifier) = identifier {
        reply.identifier = identifier;
    }
    reply.checksum = reply.computed_checksum();

    let mut datagram = std::vec![0u8; 20];
    datagram[0] = 0x45;
    datagram[3] = (20 + ECHO_HEADER_LEN) as u8;
    datagram[9] = 1;
    datagram.extend_from_slice(&reply.encode());
    datagram
}

/// How the fake peer answers one HTTP exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeResponse {
    Bytes(&'static [u8]),
    PeerClose,
    Hang,
    ConnectRefused,
    ReadError,
}

#[derive(Debug, Default)]
struct StreamState {
    script: VecDeque<FakeResponse>,
    current: Option<FakeResponse>,
    connects: Vec<(Ipv4Addr, u16)>,
    written: Vec<Vec<u8>>,
    flushes: u32,
    fail_open: bool,
    opened: u32,
    closed: u32,
    forced_closes: u32,
}

#[derive(Clone, Debug, Default)]
pub struct FakeStreamStack {
    state: Rc<RefCell<StreamState>>,
}

impl FakeStreamStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, responses: &[FakeResponse]) {
        self.state
            .borrow_mut()
            .script
            .extend(responses.iter().copied());
    }

    pub fn fail_open(&self) {
        self.state.borrow_mut().fail_open = true;
    }

    pub fn opened(&self) -> u32 {
        self.state.borrow().opened
    }

    pub fn closed(&self) -> u32 {
        self.state.borrow().closed
    }

    /// Closes that reset the connection instead of finishing it.
    pub fn forced_closes(&self) -> u32 {
        self.state.borrow().forced_closes
    }

    pub fn flushes(&self) -> u32 {
        self.state.borrow().flushes
    }

    pub fn connects(&self) -> Vec<(Ipv4Addr, u16)> {
        self.state.borrow().connects.clone()
    }

    /// Bytes written during each exchange, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.borrow().written.clone()
    }
}

pub struct FakeConnection {
    state: Rc<RefCell<StreamState>>,
}

impl StreamStack for FakeStreamStack {
    type Connection<'a>
        = FakeConnection
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Connection<'_>, MeterError> {
        let mut state = self.state.borrow_mut();
        if state.fail_open {
            return Err(MeterError::ResourceUnavailable);
        }
        state.opened += 1;
        let response = state.script.pop_front().unwrap_or(FakeResponse::Hang);
        state.current = Some(response);
        state.written.push(Vec::new());
        Ok(FakeConnection {
            state: self.state.clone(),
        })
    }
}

impl StreamConnection for FakeConnection {
    async fn connect(&mut self, remote: Ipv4Addr, port: u16) -> Result<(), MeterError> {
        let mut state = self.state.borrow_mut();
        state.connects.push((remote, port));
        match state.current {
            Some(FakeResponse::ConnectRefused) => Err(MeterError::TransportError),
            _ => Ok(()),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), MeterError> {
        let mut state = self.state.borrow_mut();
        if let Some(buffer) = state.written.last_mut() {
            buffer.extend_from_slice(data);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), MeterError> {
        self.state.borrow_mut().flushes += 1;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        let current = self.state.borrow().current;
        match current {
            Some(FakeResponse::Bytes(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Some(FakeResponse::PeerClose) => Ok(0),
            Some(FakeResponse::ReadError) => Err(MeterError::TransportError),
            _ => core::future::pending().await,
        }
    }

    async fn close(&mut self, forced: bool) {
        let mut state = self.state.borrow_mut();
        state.closed += 1;
        if forced {
            state.forced_closes += 1;
        }
    }
}

#[derive(Debug)]
struct LinkState {
    admin_up: bool,
    link_up: bool,
    bring_up_results: VecDeque<bool>,
    bring_downs: u32,
    bring_ups: u32,
}

#[derive(Clone, Debug)]
pub struct FakeLink {
    state: Rc<RefCell<LinkState>>,
}

impl FakeLink {
    pub fn up() -> Self {
        Self {
            state: Rc::new(RefCell::new(LinkState {
                admin_up: true,
                link_up: true,
                bring_up_results: VecDeque::new(),
                bring_downs: 0,
                bring_ups: 0,
            })),
        }
    }

    pub fn drop_link(&self) {
        self.state.borrow_mut().link_up = false;
    }

    pub fn disable_admin(&self) {
        self.state.borrow_mut().admin_up = false;
    }

    /// Outcomes of successive `bring_up` calls; unscripted calls fail.
    pub fn script_bring_up(&self, results: &[bool]) {
        self.state
            .borrow_mut()
            .bring_up_results
            .extend(results.iter().copied());
    }

    pub fn bring_downs(&self) -> u32 {
        self.state.borrow().bring_downs
    }

    pub fn bring_ups(&self) -> u32 {
        self.state.borrow().bring_ups
    }
}

impl LinkControl for FakeLink {
    fn is_admin_up(&self) -> bool {
        self.state.borrow().admin_up
    }

    fn is_link_up(&self) -> bool {
        self.state.borrow().link_up
    }

    async fn bring_down(&mut self) {
        let mut state = self.state.borrow_mut();
        state.bring_downs += 1;
        state.admin_up = false;
        state.link_up = false;
    }

    async fn bring_up(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        state.bring_ups += 1;
        let ok = state.bring_up_results.pop_front().unwrap_or(false);
        state.admin_up = ok;
        state.link_up = ok;
        ok
    }
}

#[derive(Clone, Debug)]
pub struct FakeSensor {
    celsius: f32,
    reads: Rc<Cell<u32>>,
}

impl FakeSensor {
    pub fn new(celsius: f32) -> Self {
        Self {
            celsius,
            reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn reads(&self) -> u32 {
        self.reads.get()
    }
}

impl TemperatureSensor for FakeSensor {
    fn read_celsius(&mut self) -> f32 {
        self.reads.set(self.reads.get() + 1);
        self.celsius
    }
}

#[derive(Clone, Debug, Default)]
pub struct FakeDevice {
    resets: Rc<Cell<u32>>,
}

impl FakeDevice {
    pub fn resets(&self) -> u32 {
        self.resets.get()
    }
}

impl DeviceControl for FakeDevice {
    fn reset(&mut self) {
        self.resets.set(self.resets.get() + 1);
    }
}
