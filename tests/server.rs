use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gmonad::middleware::{Cors, CorsPolicy};
use gmonad::{Dispatcher, Endpoint, Error, Method, Request, Response, Router, Server, routes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, oneshot};

fn app() -> Dispatcher {
    let policy = CorsPolicy::builder()
        .allow_origin("https://example.com")
        .allow_method(Method::Get)
        .allow_credentials(true)
        .build()
        .unwrap();
    Dispatcher::new(routes::setup(Router::new())).register(Cors::new(policy))
}

async fn send(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap().to_ascii_lowercase()
}

#[tokio::test]
async fn serves_requests_over_the_wire_and_drains_on_shutdown() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(server.serve_with_shutdown(app(), async {
        let _ = stopped.await;
    }));

    let health = send(addr, "GET /healthz HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;
    assert!(health.starts_with("http/1.1 200"), "{health}");
    assert!(health.ends_with("\r\n\r\nok"), "{health}");

    let preflight = send(
        addr,
        "OPTIONS /healthz HTTP/1.1\r\nhost: test\r\norigin: https://example.com\r\n\
         access-control-request-method: GET\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(preflight.starts_with("http/1.1 204"), "{preflight}");
    assert!(preflight.contains("access-control-allow-origin: https://example.com"), "{preflight}");
    assert!(preflight.contains("access-control-allow-credentials: true"), "{preflight}");

    let missing = send(addr, "GET /nope HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;
    assert!(missing.starts_with("http/1.1 404"), "{missing}");

    let unknown = send(addr, "PURGE /healthz HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n").await;
    assert!(unknown.starts_with("http/1.1 405"), "{unknown}");

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn binding_an_occupied_port_is_a_bind_error() {
    let taken = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().to_string();

    match Server::bind(&addr).await {
        Err(Error::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second bind on {addr} succeeded"),
    }
}

/// Sets its flag when dropped.
struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Takes far longer than the client is willing to wait.
struct Slow {
    started: Arc<Notify>,
    dropped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl Endpoint for Slow {
    async fn call(&self, _req: Request) -> Response {
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(3)).await;
        self.finished.store(true, Ordering::SeqCst);
        Response::text("too late")
    }
}

#[tokio::test]
async fn peer_disconnect_drops_the_in_flight_dispatch() {
    let started = Arc::new(Notify::new());
    let dropped = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let slow = Slow {
        started: Arc::clone(&started),
        dropped: Arc::clone(&dropped),
        finished: Arc::clone(&finished),
    };

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let app = Dispatcher::new(Router::new().get("/slow", slow));
    let running = tokio::spawn(server.serve_with_shutdown(app, async {
        let _ = stopped.await;
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET /slow HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
    started.notified().await;
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("dispatch future outlived its connection");
    assert!(!finished.load(Ordering::SeqCst));

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
}
