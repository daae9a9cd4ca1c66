use core::fmt::Write as _;
use core::net::Ipv4Addr;

use heapless::String;

use crate::error::MeterError;
use crate::net::StreamConnection;

pub const REQUEST_CAPACITY: usize = 1024;
/// Only the first chunk of the response is inspected.
pub const RESPONSE_CHUNK_LEN: usize = 128;
const STATUS_WINDOW: core::ops::Range<usize> = 9..12;

/// Where and as whom records are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub org: &'a str,
    pub bucket: &'a str,
    pub token: &'a str,
}

pub fn build_request(
    target: &WriteTarget<'_>,
    payload: &str,
) -> Result<String<REQUEST_CAPACITY>, MeterError> {
    let mut request = String::new();
    write!(
        request,
        "POST /api/v2/write?org={}&bucket={}&precision=ms HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Authorization: Token {}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        target.org,
        target.bucket,
        target.host,
        target.port,
        target.token,
        payload.len(),
        payload
    )
    .map_err(|_| MeterError::ResourceUnavailable)?;
    Ok(request)
}

/// Accepts only a status line whose code is `204`.
pub fn classify_response(chunk: &[u8]) -> Result<(), MeterError> {
    match chunk.get(STATUS_WINDOW) {
        Some(b"204") => Ok(()),
        _ => Err(MeterError::RemoteRejected),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangePhase {
    Connecting,
    Sending,
    AwaitingResponse,
    Done,
}

impl ExchangePhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Sending => "sending",
            Self::AwaitingResponse => "awaiting_response",
            Self::Done => "done",
        }
    }
}

/// State of one report attempt. Built per attempt and dropped with it.
pub struct HttpExchange {
    request: String<REQUEST_CAPACITY>,
    phase: ExchangePhase,
    complete: bool,
    success: bool,
}

impl HttpExchange {
    pub fn new(request: String<REQUEST_CAPACITY>) -> Self {
        Self {
            request,
            phase: ExchangePhase::Connecting,
            complete: false,
            success: false,
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Connect, send the whole request, then classify the first chunk of
    /// the reply. Unbounded; the caller races it against a deadline.
    pub async fn drive<K: StreamConnection>(
        &mut self,
        connection: &mut K,
        remote: Ipv4Addr,
        port: u16,
    ) -> Result<(), MeterError> {
        self.phase = ExchangePhase::Connecting;
        connection.connect(remote, port).await?;

        self.phase = ExchangePhase::Sending;
        connection.write_all(self.request.as_bytes()).await?;
        connection.flush().await?;

        self.phase = ExchangePhase::AwaitingResponse;
        let mut chunk = [0u8; RESPONSE_CHUNK_LEN];
        let n = connection.read(&mut chunk).await?;
        self.phase = ExchangePhase::Done;
        self.complete = true;
        if n == 0 {
            log::warn!("report: peer closed without a response");
            return Err(MeterError::TransportError);
        }

        let result = classify_response(&chunk[..n]);
        self.success = result.is_ok();
        if !self.success {
            let status = chunk.get(..n.min(12)).unwrap_or(&[]);
            log::warn!(
                "report: bad response {:?}",
                core::str::from_utf8(status).unwrap_or("<binary>")
            );
        }
        result
    }
}
