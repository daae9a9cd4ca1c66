use core::net::Ipv4Addr;

use embassy_net::raw::{IpProtocol, IpVersion, PacketMetadata, RawSocket};
use embassy_net::Stack;
use esp_radio::wifi::WifiDevice;

use crate::error::MeterError;
use crate::net::{IcmpSocket, IcmpStack};
use crate::probe::icmp::{internet_checksum, ECHO_HEADER_LEN, IPV4_HEADER_MIN_LEN};

const RAW_META_SLOTS: usize = 4;
const RAW_RX_BYTES: usize = 512;
const RAW_TX_BYTES: usize = 256;
const DEFAULT_TTL: u8 = 64;
const PROTOCOL_ICMP: u8 = 1;
const DATAGRAM_LEN: usize = IPV4_HEADER_MIN_LEN + ECHO_HEADER_LEN;

pub struct IcmpBuffers {
    rx_meta: [PacketMetadata; RAW_META_SLOTS],
    rx: [u8; RAW_RX_BYTES],
    tx_meta: [PacketMetadata; RAW_META_SLOTS],
    tx: [u8; RAW_TX_BYTES],
}

impl IcmpBuffers {
    pub const fn new() -> Self {
        Self {
            rx_meta: [PacketMetadata::EMPTY; RAW_META_SLOTS],
            rx: [0; RAW_RX_BYTES],
            tx_meta: [PacketMetadata::EMPTY; RAW_META_SLOTS],
            tx: [0; RAW_TX_BYTES],
        }
    }
}

/// Raw IPv4/ICMP sockets on the station interface.
pub struct EspIcmpStack {
    stack: Stack<'static>,
    buffers: &'static mut IcmpBuffers,
    identification: u16,
}

impl EspIcmpStack {
    pub fn new(stack: Stack<'static>, buffers: &'static mut IcmpBuffers) -> Self {
        Self {
            stack,
            buffers,
            identification: 0,
        }
    }
}

impl IcmpStack for EspIcmpStack {
    type Socket<'a>
        = EspIcmpSocket<'a>
    where
        Self: 'a;

    fn open(&mut self) -> Result<Self::Socket<'_>, MeterError> {
        let source = self
            .stack
            .config_v4()
            .map(|config| config.address.address())
            .ok_or(MeterError::ResourceUnavailable)?;
        let buffers = &mut *self.buffers;
        let socket = RawSocket::new::<WifiDevice<'static>>(
            self.stack,
            IpVersion::Ipv4,
            IpProtocol::Icmp,
            &mut buffers.rx_meta,
            &mut buffers.rx,
            &mut buffers.tx_meta,
            &mut buffers.tx,
        );
        Ok(EspIcmpSocket {
            socket,
            source,
            identification: &mut self.identification,
        })
    }
}

pub struct EspIcmpSocket<'a> {
    socket: RawSocket<'a>,
    source: Ipv4Addr,
    identification: &'a mut u16,
}

impl IcmpSocket for EspIcmpSocket<'_> {
    async fn send_to(&mut self, dest: Ipv4Addr, message: &[u8]) -> Result<(), MeterError> {
        if message.len() != ECHO_HEADER_LEN {
            return Err(MeterError::TransportError);
        }
        *self.identification = self.identification.wrapping_add(1);
        let mut datagram = [0u8; DATAGRAM_LEN];
        write_ipv4_header(
            &mut datagram[..IPV4_HEADER_MIN_LEN],
            self.source,
            dest,
            *self.identification,
        );
        datagram[IPV4_HEADER_MIN_LEN..].copy_from_slice(message);
        self.socket.send(&datagram).await;
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, MeterError> {
        self.socket
            .recv(buf)
            .await
            .map_err(|_| MeterError::TransportError)
    }
}

fn write_ipv4_header(header: &mut [u8], source: Ipv4Addr, dest: Ipv4Addr, identification: u16) {
    header[0] = 0x45;
    header[1] = 0;
    header[2..4].copy_from_slice(&(DATAGRAM_LEN as u16).to_be_bytes());
    header[4..6].copy_from_slice(&identification.to_be_bytes());
    header[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
    header[8] = DEFAULT_TTL;
    header[9] = PROTOCOL_ICMP;
    header[10..12].copy_from_slice(&[0, 0]);
    header[12..16].copy_from_slice(&source.octets());
    header[16..20].copy_from_slice(&dest.octets());
    let checksum = internet_checksum(header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
}
