//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. stops calling `listener.accept()`, so no new connections are made;
//! 2. lets every in-flight connection task run to completion;
//! 3. returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! A peer that disconnects mid-request makes hyper drop that request's
//! dispatch future at its next suspension point. Nothing else holds on to it.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// A bound HTTP server.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds a listener on `addr` (e.g. `"0.0.0.0:8080"`).
    ///
    /// Failing to bind is fatal for the process; the caller should exit
    /// with a non-zero status.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let bind_err = |source| Error::Bind { addr: addr.to_owned(), source };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self { listener, addr })
    }

    /// The address actually bound. Useful after binding port `0`.
    pub fn local_addr(&self) -> SocketAddr { self.addr }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        self.serve_with_shutdown(dispatcher, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains in-flight connections.
    pub async fn serve_with_shutdown<F>(self, dispatcher: Dispatcher, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, addr } = self;
        let dispatcher = Arc::new(dispatcher);

        info!(%addr, middleware = ?dispatcher.middleware_names(), "gmonad listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                (stream, peer) = accept_with_backoff(|| listener.accept()) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { handle(&dispatcher, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("gmonad stopped");
        Ok(())
    }
}

/// Pause after a failed `accept`. Errors such as `EMFILE` persist until a
/// connection closes, so retrying at once would spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Retries `accept` until it yields a connection, sleeping between failures.
async fn accept_with_backoff<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                error!(backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

// ── Request conversion ───────────────────────────────────────────────────────

/// Buffers the body, builds a fresh [`Request`], dispatches it and hands
/// the finalized response to hyper. All failures become responses.
async fn handle(
    dispatcher: &Dispatcher,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(method = %parts.method, path = parts.uri.path(), "failed to read body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_http());
        }
    };

    let request = match Request::from_http(http::Request::from_parts(parts, body)) {
        Ok(request) => request,
        Err(e) => {
            debug!("{e}");
            return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_http());
        }
    };

    Ok(dispatcher.dispatch(request).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only on Windows).
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn failed_accepts_back_off_before_retrying() {
        let mut attempts = 0;
        let started = Instant::now();

        let conn = accept_with_backoff(|| {
            attempts += 1;
            let n = attempts;
            async move {
                if n <= 3 {
                    Err(io::Error::other("too many open files"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(conn, 4);
        assert!(started.elapsed() >= ACCEPT_BACKOFF * 3);
    }
}
