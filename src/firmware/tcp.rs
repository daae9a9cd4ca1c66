use core::net::Ipv4Addr;

use embassy_net::{tcp::TcpSocket, Stack};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::Write;

use crate::config::HTTP_EXCHANGE_TIMEOUT_MS;
use crate::error::MeterError;
use crate::net::{StreamConnection, StreamStack};

const TCP_RW_BUF: usize = 1024;
const CLOSE_FLUSH_TIMEOUT_MS: u64 = 250;

pub struct TcpBuffers {
    rx: [u8; TCP_RW_BUF],
    tx: [u8; TCP_RW_BUF],
}

impl TcpBuffers {
    pub const fn new() -> Self {
        Self {
            rx: [0; TCP_RW_BUF],
            tx: [0; TCP_RW_BUF],
        }
    }
}

pub struct EspTcpStack {
    stack: Stack<'static>,
    buffers: &'static mut TcpBuffers,
}

impl EspTcpStack {
    pub fn new(stack: Stack<'static>, buffers: &'static mut TcpBuffers) -> Self {
        Self { stack, buffers }
    }
}

impl StreamStack for EspTcpStack {
    type Connection<'a>
        = EspTcpConnection<'a>
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Connection<'_>, MeterError> {
        if !self.stack.is_config_up() {
            return Err(MeterError::ResourceUnavailable);
        }
        let buffers = &mut *self.buffers;
        let mut socket = TcpSocket::new(self.stack, &mut buffers.rx[..], &mut buffers.tx[..]);
        socket.set_timeout(Some(Duration::from_millis(HTTP_EXCHANGE_TIMEOUT_MS as u64)));
        Ok(EspTcpConnection { socket })
    }
}

pub struct EspTcpConnection<'a> {
    socket: TcpSocket<'a>,
}

impl StreamConnection for EspTcpConnection<'_> {
    async fn connect(&mut self, remote: Ipv4Addr, port: u16) -> Result<(), MeterError> {
        self.socket.connect((remote, port)).await.map_err(|err| {
            log::warn!("tcp: connect {}:{} err={:?}", remote, port, err);
            MeterError::TransportError
        })
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), MeterError> {
        Write::write_all(&mut self.socket, data)
            .await
            .map_err(|_| MeterError::TransportError)
    }

    async fn flush(&mut self) -> Result<(), MeterError> {
        Write::flush(&mut self.socket)
            .await
            .map_err(|_| MeterError::TransportError)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| MeterError::TransportError)
    }

    async fn close(&mut self, forced: bool) {
        if forced {
            self.socket.abort();
        } else {
            self.socket.close();
        }
        // Dropping the socket removes it from the stack, so let the FIN/RST out first.
        let flushed = with_timeout(
            Duration::from_millis(CLOSE_FLUSH_TIMEOUT_MS),
            Write::flush(&mut self.socket),
        )
        .await;
        if flushed.is_err() {
            log::debug!("tcp: close flush timed out forced={}", forced);
        }
    }
}
