use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lattice_wire::codec::BincodeCodec;
use lattice_wire::transport::{TcpAcceptor, TcpTransport};
use lattice_wire::{Channel, Error as WireError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::call::Call;
use crate::dispatch::{Registry, ServiceDispatcher};
use crate::error::{Error, Result};

/// Port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 20222;

// State the accept loop and connection tasks share with the owning server.
struct Shared {
    running: AtomicBool,
    shutdown: Notify,
}

/// RPC server: owns the service registry and the listener lifecycle.
///
/// Services are registered before `start`; the registry is then shared
/// read-only with the accept loop. `stop` is a best-effort flag plus a wakeup
/// for the accept loop; in-flight calls are left to finish on their own.
pub struct RpcServer {
    port: u16,
    registry: Registry,
    started: bool,
    shared: Arc<Shared>,
    accept_task: Option<JoinHandle<()>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::with_port(DEFAULT_PORT)
    }

    /// A server that will bind to `port`. Port 0 picks a free port at
    /// `start`; `port()` reports the bound one.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            registry: Registry::new(),
            started: false,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            accept_task: None,
        }
    }

    /// Bind a service dispatcher into the registry (first-wins, idempotent).
    ///
    /// Only valid before `start`; the registry is handed to the listener at
    /// that point and never mutated again.
    pub fn register(&mut self, dispatcher: ServiceDispatcher) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyRunning);
        }
        self.registry.register(dispatcher);
        Ok(())
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Valid at most once per server instance; returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.started {
            return Err(Error::AlreadyRunning);
        }
        self.started = true;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let acceptor = TcpAcceptor::bind(bind_addr).await?;
        let local = acceptor.local_addr()?;
        self.port = local.port();

        self.shared.running.store(true, Ordering::SeqCst);

        let registry = Arc::new(std::mem::take(&mut self.registry));
        let shared = Arc::clone(&self.shared);
        self.accept_task = Some(tokio::spawn(accept_loop(acceptor, registry, shared)));

        info!(%local, "rpc server started");
        Ok(local)
    }

    /// Signal the accept loop to stop taking connections.
    ///
    /// Idempotent; does not wait for in-flight calls.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            // notify_one stores a permit when the accept loop is not parked
            // in select! yet, so a stop issued before the loop's first poll
            // still lands.
            self.shared.shutdown.notify_one();
            info!("rpc server stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(acceptor: TcpAcceptor, registry: Arc<Registry>, shared: Arc<Shared>) {
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            _ = shared.shutdown.notified() => break,
            accepted = acceptor.accept() => match accepted {
                Ok((transport, peer)) => {
                    // A stop can land while we were parked in accept; a
                    // connection raced in that case is dropped, not served.
                    if !shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    debug!(%peer, "connection accepted");
                    let registry = Arc::clone(&registry);
                    tokio::spawn(serve_connection(transport, registry, peer));
                }
                Err(e) => {
                    if !shared.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    shared.running.store(false, Ordering::SeqCst);
    debug!("accept loop stopped");
}

/// Serve call envelopes on one accepted connection until the peer hangs up.
///
/// Dispatch outcomes, including faults, are always written back; only wire
/// failures end the connection, and never the accept loop.
async fn serve_connection(transport: TcpTransport, registry: Arc<Registry>, peer: SocketAddr) {
    let mut channel = Channel::from_transport(transport, BincodeCodec);
    loop {
        let mut call: Call = match channel.receive().await {
            Ok(call) => call,
            Err(WireError::ConnectionClosed) => break,
            Err(e) => {
                warn!(%peer, error = %e, "dropping connection");
                break;
            }
        };

        debug!(%peer, service = %call.service, method = %call.method, "dispatching call");
        registry.dispatch(&mut call);

        if let Err(e) = channel.send(&call).await {
            warn!(%peer, error = %e, "failed to write response");
            break;
        }
    }
    // The peer has usually gone already; a failed shutdown is not
    // interesting.
    let _ = channel.close().await;
}
