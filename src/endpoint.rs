//! Terminal request handlers.
//!
//! An [`Endpoint`] is what a route resolves to. It uses the same
//! `async-trait` shape as [`Middleware`](crate::middleware::Middleware) minus
//! the `next` continuation: it always answers.
//!
//! Plain async functions are endpoints already:
//!
//! ```rust
//! use gmonad::{Request, Router};
//!
//! async fn hello(_req: Request) -> &'static str { "hello" }
//!
//! let router = Router::new().get("/", hello);
//! ```
//!
//! Endpoints that carry state implement the trait on a struct:
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use async_trait::async_trait;
//! use gmonad::{Endpoint, Request, Response, Router};
//!
//! struct Hits(AtomicU64);
//!
//! #[async_trait]
//! impl Endpoint for Hits {
//!     async fn call(&self, _req: Request) -> Response {
//!         let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
//!         Response::text(n.to_string())
//!     }
//! }
//!
//! let router = Router::new().get("/hits", Hits(AtomicU64::new(0)));
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Answers a routed request.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, req: Request) -> Response;
}

/// Shared endpoint as stored in the route table.
pub(crate) type SharedEndpoint = Arc<dyn Endpoint>;

#[async_trait]
impl<F, Fut, R> Endpoint for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    async fn call(&self, req: Request) -> Response {
        (self)(req).await.into_response()
    }
}
