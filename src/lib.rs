//! # gmonad
//!
//! The HTTP front of the gmonad service: layered config, one-shot logging,
//! a CORS-first middleware chain, a radix-tree router and a tokio/hyper
//! server. Nothing more.
//!
//! ## Request path
//!
//! ```text
//! connection → Server → Dispatcher → Cors → … → Router → handler
//!                                      ↑ response flows back in reverse ↓
//! ```
//!
//! Every middleware either answers the request itself or forwards it with
//! [`middleware::Next::run`]. Panics below the dispatcher become `500`s; a
//! missing route becomes `404`. Neither reaches the connection.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gmonad::middleware::{Cors, CorsPolicy};
//! use gmonad::{Dispatcher, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gmonad::Error> {
//!     let router = Router::new().get("/users/{id}", get_user);
//!     let cors = CorsPolicy::builder()
//!         .allow_origin("https://app.example.com")
//!         .build()?;
//!     let app = Dispatcher::new(router).register(Cors::new(cors));
//!
//!     Server::bind("0.0.0.0:8080").await?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//! ```

mod dispatcher;
mod endpoint;
mod error;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod logger;
pub mod middleware;
pub mod routes;

pub use config::{Config, Settings};
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use endpoint::Endpoint;
pub use logger::Logger;
pub use method::{Method, UnknownMethod};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Match, Router};
pub use server::Server;
