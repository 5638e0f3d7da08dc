//! Lattice Wire - framed transport and codec layer
//!
//! One `Transport` instance owns one stream connection and exchanges
//! length-prefixed byte frames. A `Codec` turns typed messages into those
//! frames; a `Channel` combines the two for persistent request/response
//! traffic.
//!
//! # Example
//!
//! ```no_run
//! use lattice_wire::{Channel, codec::BincodeCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping { seq: u32 }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong { seq: u32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:20222".parse()?;
//! let mut channel = Channel::tcp(addr, BincodeCodec).await?;
//! channel.send(&Ping { seq: 1 }).await?;
//! let pong: Pong = channel.receive().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod transport;

pub use channel::Channel;
pub use error::{Error, Result};
pub use transport::{TcpAcceptor, TcpTransport, Transport};
