use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};

/// Largest frame a peer may send. Anything above this is treated as a
/// corrupt or hostile length prefix, not a real message.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// One stream connection exchanging length-prefixed byte frames.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame over the transport.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive one complete frame from the transport.
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection.
    async fn close(&mut self) -> Result<()>;
}

/// TCP transport with length-prefix framing.
///
/// Frames are a 4-byte big-endian length followed by the payload.
pub struct TcpTransport {
    stream: TcpStream,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Connect to a remote address with no timeouts.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().connect(addr).await
    }

    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::default()
    }

    /// Wrap an already-accepted stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            send_timeout: None,
            receive_timeout: None,
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        // Enforced on both sides; an unchecked cast here would also truncate
        // the prefix for payloads past u32::MAX.
        if bytes.len() > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!(
                "frame of {} bytes exceeds limit",
                bytes.len()
            )));
        }
        self.stream.write_u32(bytes.len() as u32).await?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let len = self.stream.read_u32().await.map_err(eof_as_closed)? as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!("frame of {len} bytes exceeds limit")));
        }
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(eof_as_closed)?;
        Ok(buf)
    }
}

// A peer hanging up between frames shows as EOF on the next read; callers
// care about "closed", not the raw IO kind.
fn eof_as_closed(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write_frame(bytes))
                .await
                .map_err(|_| Error::Timeout("send"))?,
            None => self.write_frame(bytes).await,
        }
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        match self.receive_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| Error::Timeout("receive"))?,
            None => self.read_frame().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Builder for configuring a TCP transport before connecting.
#[derive(Default)]
pub struct TcpTransportBuilder {
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransportBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub async fn connect(self, addr: SocketAddr) -> Result<TcpTransport> {
        let connecting = TcpStream::connect(addr);
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| Error::Timeout("connect"))??,
            None => connecting.await?,
        };

        Ok(TcpTransport {
            stream,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        })
    }
}

/// Listening socket that accepts inbound framed TCP connections.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream), addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}
