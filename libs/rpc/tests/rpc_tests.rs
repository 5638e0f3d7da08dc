use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lattice_rpc::{
    Error, Fault, FaultKind, Proxy, RpcServer, Schema, ServiceDispatcher,
};
use lattice_wire::transport::TcpAcceptor;
use lattice_wire::Error as WireError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The reference implementation the proxy results are compared against.
struct EchoService;

impl EchoService {
    fn echo(&self, input: String) -> String {
        input
    }
}

fn echo_dispatcher() -> ServiceDispatcher {
    let service = Arc::new(EchoService);
    ServiceDispatcher::new("Echo").method1("echo", move |s: String| Ok(service.echo(s)))
}

fn echo_schema() -> Schema {
    Schema::new("Echo").method1::<String>("echo")
}

async fn start_server(dispatchers: Vec<ServiceDispatcher>) -> (RpcServer, SocketAddr) {
    let mut server = RpcServer::with_port(0);
    for dispatcher in dispatchers {
        server.register(dispatcher).unwrap();
    }
    let addr = server.start().await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn proxy_call_matches_local_invocation() {
    init_tracing();
    let (server, addr) = start_server(vec![echo_dispatcher()]).await;

    let mut proxy = Proxy::connect(echo_schema(), "127.0.0.1", addr.port())
        .await
        .unwrap();
    let remote: String = proxy.call1("echo", "ping".to_string()).await.unwrap();

    assert_eq!(remote, "ping");
    assert_eq!(remote, EchoService.echo("ping".to_string()));
    server.stop();
}

#[tokio::test]
async fn unregistered_service_is_an_explicit_error() {
    init_tracing();
    let (server, addr) = start_server(vec![echo_dispatcher()]).await;

    let schema = Schema::new("Ghost").method0("poke");
    let mut proxy = Proxy::connect(schema, "127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call0("poke").await;
    match result.unwrap_err() {
        Error::ServiceNotRegistered(service) => assert_eq!(service, "Ghost"),
        e => panic!("expected ServiceNotRegistered, got {e:?}"),
    }
    server.stop();
}

#[tokio::test]
async fn handler_fault_roundtrips_to_the_caller() {
    init_tracing();
    let refusing = ServiceDispatcher::new("Vault").method1("open", |_: String| {
        Err::<String, _>(Fault::handler("access denied"))
    });
    let (server, addr) = start_server(vec![refusing]).await;

    let schema = Schema::new("Vault").method1::<String>("open");
    let mut proxy = Proxy::connect(schema, "127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call1("open", "sesame".to_string()).await;
    match result.unwrap_err() {
        Error::Remote(fault) => {
            assert_eq!(fault.kind, FaultKind::Handler);
            assert_eq!(fault.message, "access denied");
        }
        e => panic!("expected Remote fault, got {e:?}"),
    }
    server.stop();
}

#[tokio::test]
async fn sequential_calls_are_independent() {
    init_tracing();
    let counter = Arc::new(AtomicU64::new(0));
    let count = Arc::clone(&counter);
    let pair = ServiceDispatcher::new("Pair")
        .method0("first", || Ok("one".to_string()))
        .method0("second", || Ok("two".to_string()))
        .method0("next", move || {
            Ok(count.fetch_add(1, Ordering::SeqCst) + 1)
        });
    let (server, addr) = start_server(vec![pair]).await;

    let schema = Schema::new("Pair")
        .method0("first")
        .method0("second")
        .method0("next");
    let mut proxy = Proxy::connect(schema, "127.0.0.1", addr.port())
        .await
        .unwrap();

    let first: String = proxy.call0("first").await.unwrap();
    let second: String = proxy.call0("second").await.unwrap();
    assert_eq!(first, "one");
    assert_eq!(second, "two");

    // One owned implementation instance serves every call.
    let n1: u64 = proxy.call0("next").await.unwrap();
    let n2: u64 = proxy.call0("next").await.unwrap();
    assert_eq!((n1, n2), (1, 2));
    server.stop();
}

#[tokio::test]
async fn undeclared_method_fails_without_a_round_trip() {
    init_tracing();
    let (server, addr) = start_server(vec![echo_dispatcher()]).await;

    let mut proxy = Proxy::connect(echo_schema(), "127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call0("vanish").await;
    match result.unwrap_err() {
        Error::UnknownMethod { service, method } => {
            assert_eq!(service, "Echo");
            assert_eq!(method, "vanish");
        }
        e => panic!("expected UnknownMethod, got {e:?}"),
    }
    server.stop();
}

#[tokio::test]
async fn mismatched_signature_is_an_invocation_error() {
    init_tracing();
    let (server, addr) = start_server(vec![echo_dispatcher()]).await;

    // The client declares echo(i64), the implementation only has
    // echo(String); the server must refuse, not silently coerce.
    let schema = Schema::new("Echo").method1::<i64>("echo");
    let mut proxy = Proxy::connect(schema, "127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call1("echo", 7i64).await;
    match result.unwrap_err() {
        Error::Remote(fault) => assert_eq!(fault.kind, FaultKind::MethodNotFound),
        e => panic!("expected MethodNotFound fault, got {e:?}"),
    }
    server.stop();
}

#[tokio::test]
async fn stopped_server_refuses_connections() {
    init_tracing();
    let (mut server, addr) = start_server(vec![echo_dispatcher()]).await;
    assert!(server.is_running());

    server.stop();
    assert!(!server.is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = Proxy::connect(echo_schema(), "127.0.0.1", addr.port()).await;
    match result {
        Err(Error::Wire(_)) => {}
        Ok(_) => panic!("connect to a stopped server should fail"),
        Err(e) => panic!("expected a transport error, got {e:?}"),
    }

    // Starting again is not part of the lifecycle.
    match server.start().await {
        Err(Error::AlreadyRunning) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_right_after_start_takes_effect() {
    init_tracing();
    let mut server = RpcServer::with_port(0);
    server.register(echo_dispatcher()).unwrap();
    let addr = server.start().await.unwrap();

    // Stop before the accept task has had a chance to be polled; the signal
    // must not be lost.
    server.stop();
    assert!(!server.is_running());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = Proxy::connect(echo_schema(), "127.0.0.1", addr.port()).await;
    match result {
        Err(Error::Wire(_)) => {}
        Ok(_) => panic!("stopped server still accepting connections"),
        Err(e) => panic!("expected a transport error, got {e:?}"),
    }
}

#[tokio::test]
async fn registration_after_start_is_rejected() {
    init_tracing();
    let (mut server, _addr) = start_server(vec![]).await;

    let result = server.register(echo_dispatcher());
    match result {
        Err(Error::AlreadyRunning) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    server.stop();
}

#[tokio::test]
async fn dead_peer_surfaces_as_timeout_not_a_hang() {
    init_tracing();
    // A raw acceptor that takes the connection and never answers.
    let acceptor = TcpAcceptor::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = acceptor.local_addr().unwrap();
    tokio::spawn(async move {
        let (_transport, _peer) = acceptor.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let mut proxy = Proxy::builder(echo_schema())
        .call_timeout(Duration::from_millis(100))
        .connect("127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call1("echo", "ping".to_string()).await;
    match result.unwrap_err() {
        Error::Wire(WireError::Timeout(op)) => assert_eq!(op, "receive"),
        e => panic!("expected a wire timeout, got {e:?}"),
    }
}

#[tokio::test]
async fn handler_panic_never_kills_the_connection() {
    init_tracing();
    let volatile = ServiceDispatcher::new("Volatile")
        .method0("boom", || -> Result<String, Fault> { panic!("kaboom") })
        .method0("calm", || Ok("still here".to_string()));
    let (server, addr) = start_server(vec![volatile]).await;

    let schema = Schema::new("Volatile").method0("boom").method0("calm");
    let mut proxy = Proxy::connect(schema, "127.0.0.1", addr.port())
        .await
        .unwrap();

    let result: Result<String, _> = proxy.call0("boom").await;
    match result.unwrap_err() {
        Error::Remote(fault) => {
            assert_eq!(fault.kind, FaultKind::Handler);
            assert_eq!(fault.message, "kaboom");
        }
        e => panic!("expected Remote fault, got {e:?}"),
    }

    // Same proxy, same connection: the panic was contained per-call.
    let calm: String = proxy.call0("calm").await.unwrap();
    assert_eq!(calm, "still here");
    server.stop();
}

#[tokio::test]
async fn concurrent_proxies_are_served_independently() {
    init_tracing();
    let (server, addr) = start_server(vec![echo_dispatcher()]).await;
    let port = addr.port();

    let mut tasks = Vec::new();
    for i in 0..8u32 {
        tasks.push(tokio::spawn(async move {
            let mut proxy = Proxy::connect(echo_schema(), "127.0.0.1", port)
                .await
                .unwrap();
            let payload = format!("ping-{i}");
            let reply: String = proxy.call1("echo", payload.clone()).await.unwrap();
            assert_eq!(reply, payload);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    server.stop();
}
