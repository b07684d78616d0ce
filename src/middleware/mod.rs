//! Middleware layer.
//!
//! A middleware sees every request before the router does. For each request
//! it does exactly one of two things:
//!
//! - **handle**: build and return a [`Response`] without touching `next`;
//!   the chain stops there.
//! - **forward**: call [`Next::run`], which runs the rest of the chain and
//!   the matched handler, then optionally adjust the returned response on
//!   its way back out.
//!
//! `Next::run` takes `self` by value, so forwarding twice from one link is a
//! compile error rather than a runtime surprise.
//!
//! ```rust
//! use async_trait::async_trait;
//! use gmonad::middleware::{Middleware, Next};
//! use gmonad::{Request, Response};
//!
//! struct PoweredBy;
//!
//! #[async_trait]
//! impl Middleware for PoweredBy {
//!     async fn handle(&self, req: Request, next: Next<'_>) -> Response {
//!         let mut res = next.run(req).await;
//!         res.headers_mut().insert("x-powered-by", "gmonad".parse().unwrap());
//!         res
//!     }
//! }
//! ```

mod cors;

pub use cors::{Cors, CorsPolicy, CorsPolicyBuilder};

use async_trait::async_trait;

use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A request interceptor in the dispatch chain.
///
/// Implementations are shared by every connection task and must not keep
/// per-request state in `self`. Use the request's extensions for that.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Name shown when the chain is inspected.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Response;
}

/// Continuation into the remainder of the chain.
///
/// Holds the links after the current one plus the router that terminates
/// the chain.
pub struct Next<'a> {
    chain: &'a [Box<dyn Middleware>],
    endpoint: &'a Router,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Box<dyn Middleware>], endpoint: &'a Router) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the next link, or the router once the chain is exhausted.
    pub async fn run(self, req: Request) -> Response {
        match self.chain.split_first() {
            Some((link, rest)) => link.handle(req, Next::new(rest, self.endpoint)).await,
            None => self.endpoint.route(req).await,
        }
    }
}
