//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. The router is the
//! terminal link of the [`Dispatcher`](crate::Dispatcher): every request
//! that survives the middleware chain lands here.
//!
//! When several patterns match the same path, static segments win over
//! parameters (`/users/me` beats `/users/{id}`) and parameters win over
//! catch-alls (`/users/{id}` beats `/users/{*rest}`).

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::endpoint::{Endpoint, SharedEndpoint};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// Result of matching a `(method, path)` pair against the route table.
pub enum Match {
    Found(Arc<dyn Endpoint>, HashMap<String, String>),
    NotFound,
}

/// The application router.
///
/// Build it once at startup and hand it to the dispatcher.
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedEndpoint>>,
    fallback: SharedEndpoint,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), fallback: Arc::new(not_found) }
    }

    /// Register an endpoint for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax, catch-alls `{*name}`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for the same method. Route tables are built at
    /// startup, so this surfaces before the server accepts traffic.
    pub fn on(mut self, method: Method, path: &str, endpoint: impl Endpoint) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(endpoint) as SharedEndpoint)
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, endpoint: impl Endpoint) -> Self {
        self.on(Method::Get, path, endpoint)
    }

    pub fn post(self, path: &str, endpoint: impl Endpoint) -> Self {
        self.on(Method::Post, path, endpoint)
    }

    pub fn put(self, path: &str, endpoint: impl Endpoint) -> Self {
        self.on(Method::Put, path, endpoint)
    }

    pub fn patch(self, path: &str, endpoint: impl Endpoint) -> Self {
        self.on(Method::Patch, path, endpoint)
    }

    pub fn delete(self, path: &str, endpoint: impl Endpoint) -> Self {
        self.on(Method::Delete, path, endpoint)
    }

    /// Replaces the endpoint used when no route matches.
    pub fn fallback(mut self, endpoint: impl Endpoint) -> Self {
        self.fallback = Arc::new(endpoint);
        self
    }

    pub fn matches(&self, method: Method, path: &str) -> Match {
        let Some(tree) = self.routes.get(&method) else {
            return Match::NotFound;
        };
        match tree.at(path) {
            Ok(matched) => {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                Match::Found(Arc::clone(matched.value), params)
            }
            Err(_) => Match::NotFound,
        }
    }

    pub(crate) async fn route(&self, mut req: Request) -> Response {
        match self.matches(req.method(), req.path()) {
            Match::Found(endpoint, params) => {
                req.params = params;
                endpoint.call(req).await
            }
            Match::NotFound => {
                debug!(method = %req.method(), path = req.path(), "no route matched");
                self.fallback.call(req).await
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text("404 page not found")
}
