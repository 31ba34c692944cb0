//! # Transport Abstraction
//!
//! A minimal async interface for moving bytes to a server and back.
//!
//! The transport knows nothing about frames, codecs or objects. It sends one
//! opaque buffer and returns the opaque reply. Anything richer is built on
//! top of it by [`FramedClient`](crate::client::FramedClient).

use std::fmt;

/// Errors at the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// No reply arrived in time.
    Timeout,
    /// The payload exceeds the transport's frame limit.
    PayloadTooLarge(usize),
    /// Any other I/O failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::PayloadTooLarge(len) => {
                write!(f, "Payload of {} bytes too large for transport", len)
            }
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::ConnectionLost(e.to_string()),
            ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Sends a byte buffer and waits for the reply.
///
/// Object-safe, meant to be shared as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `payload` and returns the raw reply bytes.
    ///
    /// # invariants
    /// - Must return `Err` if the exchange did not complete.
    /// - Must not interpret the payload.
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>>;
}
