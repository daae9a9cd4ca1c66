//! Seams between the measurement pipeline and the platform: clock, sockets,
//! link control, sensors and device reset.

use core::net::Ipv4Addr;

use crate::error::MeterError;

/// Monotonic microsecond clock with cooperative sleeps.
pub trait MonotonicClock {
    fn now_us(&self) -> u64;

    async fn sleep_ms(&self, millis: u32);

    async fn sleep_until_us(&self, deadline_us: u64);

    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }
}

/// Raw IPv4 socket for protocol ICMP, bound to any local address.
pub trait IcmpSocket {
    /// Sends one ICMP message; the stack adds the IPv4 header.
    async fn send_to(&mut self, dest: Ipv4Addr, message: &[u8]) -> Result<(), MeterError>;

    /// Receives one datagram, IPv4 header included.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, MeterError>;
}

/// Hands out raw ICMP sockets. Dropping the socket releases it.
pub trait IcmpStack {
    type Socket<'a>: IcmpSocket
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Socket<'_>, MeterError>;
}

/// One connection-oriented socket, used for a single exchange.
pub trait StreamConnection {
    async fn connect(&mut self, remote: Ipv4Addr, port: u16) -> Result<(), MeterError>;

    async fn write_all(&mut self, data: &[u8]) -> Result<(), MeterError>;

    async fn flush(&mut self) -> Result<(), MeterError>;

    /// Returns `Ok(0)` once the peer closed the connection.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError>;

    /// Shuts the connection down and waits, bounded, for the FIN (or the
    /// reset when `forced`) to leave. Never fails.
    async fn close(&mut self, forced: bool);
}

pub trait StreamStack {
    type Connection<'a>: StreamConnection
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Connection<'_>, MeterError>;
}

/// Station interface supervision.
pub trait LinkControl {
    fn is_admin_up(&self) -> bool;

    fn is_link_up(&self) -> bool;

    async fn bring_down(&mut self);

    /// Returns `true` once the interface is associated and configured.
    async fn bring_up(&mut self) -> bool;
}

pub trait TemperatureSensor {
    fn read_celsius(&mut self) -> f32;
}

pub trait DeviceControl {
    /// Restarts the device. Test doubles may return.
    fn reset(&mut self);
}

/// Parses a literal dotted-quad IPv4 address: exactly three `.` separators,
/// digits everywhere else, every octet within `0..=255`.
pub fn parse_dotted_quad(text: &str) -> Result<Ipv4Addr, MeterError> {
    let mut dots = 0u8;
    for byte in text.bytes() {
        match byte {
            b'.' => dots += 1,
            b'0'..=b'9' => {}
            _ => return Err(MeterError::InvalidAddress),
        }
    }
    if dots != 3 {
        return Err(MeterError::InvalidAddress);
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(text.split('.')) {
        if part.is_empty() || part.len() > 3 {
            return Err(MeterError::InvalidAddress);
        }
        *slot = part.parse::<u8>().map_err(|_| MeterError::InvalidAddress)?;
    }
    Ok(Ipv4Addr::from(octets))
}
