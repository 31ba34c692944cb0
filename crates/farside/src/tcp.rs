//! # TCP Transport
//!
//! Length-delimited request/response exchange over a TCP connection.
//!
//! Every message is a 4-byte big-endian length followed by that many bytes.
//! The connection is opened lazily on the first call and kept for later
//! ones. A failed exchange drops the connection, so the next call starts from
//! a fresh one; a retry policy wrapped around the client therefore sees a
//! reconnect on every attempt.
//!
//! ## Invariants
//!
//! - One exchange at a time per connection; calls queue on an async mutex,
//!   which keeps a single caller's calls in issue order.
//! - Frames above [`MAX_FRAME_LEN`] are refused in both directions.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::handles::ServerAddr;
use crate::transport;
use crate::transport::Error;
use crate::transport::Transport;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> transport::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::PayloadTooLarge(payload.len()));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame. Returns `None` if the peer closed the
/// stream cleanly before a new frame started.
pub async fn read_frame<R>(reader: &mut R) -> transport::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(Error::PayloadTooLarge(len));
    }
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// A [`Transport`] over one lazily established TCP connection.
pub struct TcpTransport {
    addr: ServerAddr,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    pub fn new(addr: ServerAddr, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
            io_timeout,
            stream: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    async fn connect(&self) -> transport::Result<TcpStream> {
        let target = (self.addr.host.as_str(), self.addr.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| Error::Timeout)??;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "connected");
        Ok(stream)
    }
}

async fn exchange(stream: &mut TcpStream, payload: &[u8]) -> transport::Result<Vec<u8>> {
    write_frame(stream, payload).await?;
    read_frame(stream)
        .await?
        .ok_or_else(|| Error::ConnectionLost("connection closed by peer".into()))
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn call(&self, payload: &[u8]) -> transport::Result<Vec<u8>> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        let mut slot = self.stream.lock().await;
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        // on any failure the stream is dropped here and the slot stays empty
        let reply = tokio::time::timeout(self.io_timeout, exchange(&mut stream, payload))
            .await
            .map_err(|_| Error::Timeout)??;

        *slot = Some(stream);
        Ok(reply)
    }
}
