//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Uri};

use crate::method::{Method, UnknownMethod};

/// An incoming HTTP request with its body fully buffered.
///
/// Everything but the [extensions](Request::extensions_mut) is read-only to
/// middleware. Extensions are the per-request context bag: a link earlier in
/// the chain inserts a typed value, a later link or the handler reads it.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Converts a buffered `http` request. Fails if the method is outside
    /// the supported set.
    pub fn from_http(req: http::Request<Bytes>) -> Result<Self, UnknownMethod> {
        let (parts, body) = req.into_parts();
        Ok(Self {
            method: Method::try_from(&parts.method)?,
            uri: parts.uri,
            headers: parts.headers,
            body,
            extensions: parts.extensions,
            params: HashMap::new(),
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup by name; `HeaderMap` keys are case-insensitive. Values
    /// that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }
}
