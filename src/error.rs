use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeterError {
    /// Literal address is not a dotted quad; rejected before any I/O.
    InvalidAddress,
    /// Socket or connection could not be allocated.
    ResourceUnavailable,
    /// No matching reply or no completion before the deadline.
    Timeout,
    /// Stack reported a connect/send/receive failure.
    TransportError,
    /// ICMP datagram failed checksum or identifier matching.
    ProtocolMismatch,
    /// Database answered with anything but `204`.
    RemoteRejected,
    /// Statistics requested for a session without a single reply.
    AllLost,
}

impl MeterError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidAddress => "invalid_address",
            Self::ResourceUnavailable => "resource_unavailable",
            Self::Timeout => "timeout",
            Self::TransportError => "transport_error",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::RemoteRejected => "remote_rejected",
            Self::AllLost => "all_lost",
        }
    }
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
