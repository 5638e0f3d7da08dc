use std::net::SocketAddr;
use std::time::Duration;

use lattice_wire::codec::BincodeCodec;
use lattice_wire::transport::TcpTransport;
use lattice_wire::Channel;

use crate::call::Call;
use crate::error::{Error, Result};

/// Timeouts applied to one connection's round trips.
///
/// `call` bounds the wait for each response; a dead peer then surfaces as a
/// transport timeout instead of blocking the caller forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub call: Option<Duration>,
}

/// Client side of one connection: owns the channel to a single remote
/// endpoint and performs one send/receive round trip per call.
pub struct Connection {
    channel: Channel<BincodeCodec>,
}

impl Connection {
    /// Connect to `addr` with no timeouts.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, Timeouts::default()).await
    }

    /// Connect to `addr`, threading the timeouts into the transport.
    pub async fn connect_with(addr: SocketAddr, timeouts: Timeouts) -> Result<Self> {
        let mut builder = TcpTransport::builder();
        if let Some(limit) = timeouts.connect {
            builder = builder.connect_timeout(limit);
        }
        if let Some(limit) = timeouts.call {
            // Bound both legs of the round trip.
            builder = builder.send_timeout(limit).receive_timeout(limit);
        }
        let transport = builder.connect(addr).await?;
        Ok(Self {
            channel: Channel::from_transport(transport, BincodeCodec),
        })
    }

    /// Resolve `host:port` and connect to the first address it yields.
    pub async fn dial(host: &str, port: u16, timeouts: Timeouts) -> Result<Self> {
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::Wire(e.into()))?
            .next()
            .ok_or_else(|| Error::Resolve(format!("{host}:{port}")))?;
        Self::connect_with(addr, timeouts).await
    }

    /// Send one call and block until its completed envelope comes back on
    /// the same connection.
    pub async fn invoke(&mut self, call: Call) -> Result<Call> {
        self.channel.send(&call).await?;
        let completed: Call = self.channel.receive().await?;
        Ok(completed)
    }
}
