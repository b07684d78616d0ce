//! Request dispatch.
//!
//! The [`Dispatcher`] owns the ordered middleware chain and the router that
//! terminates it. It knows nothing about sockets: give it a [`Request`], get
//! back a [`Response`]. The server calls it once per request; tests call it
//! directly.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::{error, info};

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Ordered middleware chain in front of a [`Router`].
///
/// ```rust
/// use gmonad::middleware::{Cors, CorsPolicy};
/// use gmonad::{Dispatcher, Router};
///
/// let policy = CorsPolicy::builder().allow_origin("*").build().unwrap();
/// let app = Dispatcher::new(Router::new()).register(Cors::new(policy));
/// assert_eq!(app.middleware_names(), ["cors"]);
/// ```
pub struct Dispatcher {
    chain: Vec<Box<dyn Middleware>>,
    router: Router,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self { chain: Vec::new(), router }
    }

    /// Appends a middleware. Links run in registration order on the way in
    /// and in reverse on the way out.
    pub fn register(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(Box::new(middleware));
        self
    }

    pub fn middleware_names(&self) -> Vec<&str> {
        self.chain.iter().map(|m| m.name()).collect()
    }

    /// Runs `req` through the chain and the router.
    ///
    /// A panic anywhere below this call is caught here and turned into a
    /// `500`; it never reaches the connection or the process.
    pub async fn dispatch(&self, req: Request) -> Response {
        let method = req.method();
        let path = req.path().to_owned();
        let started = Instant::now();

        let next = Next::new(&self.chain, &self.router);
        let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                error!(%method, %path, panic = panic_message(&*panic), "request handler panicked");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        info!(
            %method,
            %path,
            status = response.status_code().as_u16(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "request completed"
        );
        response
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
