//! Lattice RPC - a miniature remote-procedure-call framework
//!
//! A caller invokes methods on a local [`Proxy`]; each invocation becomes a
//! serializable [`Call`] envelope, travels over a dedicated framed TCP
//! connection to an [`RpcServer`], is resolved against its registry of
//! [`ServiceDispatcher`]s, executed, and the result (or fault) rides the same
//! envelope back to unblock the caller.
//!
//! Dispatch is table-driven rather than reflective: the server binds typed
//! handler closures under method keys at registration time, and the client
//! declares the same keys on a [`Schema`] so unknown methods fail before any
//! network traffic.
//!
//! # Example
//!
//! ```no_run
//! use lattice_rpc::{Proxy, RpcServer, Schema, ServiceDispatcher, DEFAULT_PORT};
//!
//! # async fn example() -> lattice_rpc::Result<()> {
//! // Server: bind an implementation and start listening.
//! let mut server = RpcServer::with_port(DEFAULT_PORT);
//! server.register(ServiceDispatcher::new("Echo").method1("echo", |s: String| Ok(s)))?;
//! server.start().await?;
//!
//! // Client: a proxy over the same interface.
//! let schema = Schema::new("Echo").method1::<String>("echo");
//! let mut proxy = Proxy::connect(schema, "127.0.0.1", DEFAULT_PORT).await?;
//! let pong: String = proxy.call1("echo", "ping".to_string()).await?;
//! assert_eq!(pong, "ping");
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod proxy;
pub mod schema;
pub mod server;

pub use call::{Call, Fault, FaultKind};
pub use client::{Connection, Timeouts};
pub use dispatch::{Registry, ServiceDispatcher};
pub use error::{Error, Result};
pub use proxy::{Proxy, ProxyBuilder};
pub use schema::{MethodKey, Schema};
pub use server::{RpcServer, DEFAULT_PORT};
