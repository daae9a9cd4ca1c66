use crate::error::MeterError;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;
/// Marks this agent's probes among unrelated ICMP traffic.
pub const ECHO_IDENTIFIER: u16 = 0xBADA;
pub const ECHO_HEADER_LEN: usize = 12;
pub const IPV4_HEADER_MIN_LEN: usize = 20;

/// Echo header as carried on the wire: type, code, checksum, identifier,
/// sequence and a millisecond timestamp, all big endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EchoHeader {
    pub kind: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub timestamp_ms: u32,
}

impl EchoHeader {
    pub fn request(sequence: u16, timestamp_ms: u32) -> Self {
        let mut header = Self {
            kind: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier: ECHO_IDENTIFIER,
            sequence,
            timestamp_ms,
        };
        header.checksum = header.computed_checksum();
        header
    }

    pub fn encode(&self) -> [u8; ECHO_HEADER_LEN] {
        let mut out = [0u8; ECHO_HEADER_LEN];
        out[0] = self.kind;
        out[1] = self.code;
        out[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        out[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        out[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        out[8..12].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..ECHO_HEADER_LEN)?;
        Some(Self {
            kind: bytes[0],
            code: bytes[1],
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            timestamp_ms: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }

    /// Checksum over the encoded header with the checksum field zeroed.
    pub fn computed_checksum(&self) -> u16 {
        let mut zeroed = *self;
        zeroed.checksum = 0;
        internet_checksum(&zeroed.encode())
    }
}

/// One's complement of the one's-complement sum of 16-bit big-endian words.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut words = bytes.chunks_exact(2);
    for word in &mut words {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = words.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyVerdict {
    Matched { sequence: u16, timestamp_ms: u32 },
    TooShort,
    ChecksumMismatch,
    NotEchoReply,
    ForeignIdentifier,
}

impl ReplyVerdict {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::TooShort => "too_short",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::NotEchoReply => "not_echo_reply",
            Self::ForeignIdentifier => "foreign_identifier",
        }
    }

    /// Discarded datagrams all surface as a protocol mismatch.
    pub const fn error(self) -> Option<MeterError> {
        match self {
            Self::Matched { .. } => None,
            _ => Some(MeterError::ProtocolMismatch),
        }
    }
}

/// Classifies a received IPv4 datagram against this agent's echo requests.
/// The sequence number is reported but not compared.
pub fn classify_datagram(datagram: &[u8]) -> ReplyVerdict {
    let Some(&first) = datagram.first() else {
        return ReplyVerdict::TooShort;
    };
    let ip_header_len = ((first & 0x0F) as usize) * 4;
    if first >> 4 != 4 || ip_header_len < IPV4_HEADER_MIN_LEN {
        return ReplyVerdict::TooShort;
    }
    if datagram.len() < ip_header_len + ECHO_HEADER_LEN {
        return ReplyVerdict::TooShort;
    }

    let Some(header) = EchoHeader::decode(&datagram[ip_header_len..]) else {
        return ReplyVerdict::TooShort;
    };
    if header.computed_checksum() != header.checksum {
        return ReplyVerdict::ChecksumMismatch;
    }
    if header.kind != ICMP_ECHO_REPLY {
        return ReplyVerdict::NotEchoReply;
    }
    if header.identifier != ECHO_IDENTIFIER {
        return ReplyVerdict::ForeignIdentifier;
    }
    ReplyVerdict::Matched {
        sequence: header.sequence,
        timestamp_ms: header.timestamp_ms,
    }
}
