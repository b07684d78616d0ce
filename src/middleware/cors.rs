//! Cross-origin resource sharing.
//!
//! [`CorsPolicy`] is the immutable rule set, built once at startup.
//! [`Cors`] is the middleware that applies it to every request:
//!
//! | Request | Outcome |
//! |---|---|
//! | no `Origin` | forwarded untouched |
//! | preflight, origin + method allowed | answered here with `204` |
//! | preflight, anything not allowed | forwarded with no CORS headers |
//! | actual request, origin allowed | forwarded, allow headers added to the response |
//! | actual request, origin not allowed | forwarded with no CORS headers |
//!
//! Nothing is ever rejected outright. Leaving out the permission headers is
//! enough for the browser to block the cross-origin read.

use std::time::Duration;

use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, HeaderMap, HeaderValue, ORIGIN,
    VARY,
};
use http::StatusCode;
use tracing::debug;

use super::{Middleware, Next};
use crate::config::CorsSettings;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

// ── Origin patterns ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum OriginPattern {
    /// `*`
    Any,
    /// `https://app.example.com`
    Exact(String),
    /// `https://*.example.com`
    Wildcard { prefix: String, suffix: String },
}

impl OriginPattern {
    fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw == "*" {
            return Ok(Self::Any);
        }
        match raw.split_once('*') {
            None => Ok(Self::Exact(raw)),
            Some((prefix, suffix)) if !suffix.contains('*') => Ok(Self::Wildcard {
                prefix: prefix.to_owned(),
                suffix: suffix.to_owned(),
            }),
            Some(_) => Err(Error::Config(format!(
                "cors origin `{raw}` may contain at most one `*`"
            ))),
        }
    }

    /// Exact and wildcard patterns; `Any` is handled separately because its
    /// response header depends on the credentials flag.
    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => false,
            Self::Exact(exact) => exact == origin,
            Self::Wildcard { prefix, suffix } => {
                origin.len() > prefix.len() + suffix.len()
                    && origin.starts_with(prefix.as_str())
                    && origin.ends_with(suffix.as_str())
            }
        }
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// The CORS rule set.
///
/// Header values are rendered once at construction, so applying the policy
/// to a request only copies precomputed values.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    origins: Vec<OriginPattern>,
    methods: Vec<Method>,
    allow_credentials: bool,
    allow_methods: HeaderValue,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
}

/// What to put in `Access-Control-Allow-Origin`.
enum AllowOrigin {
    Any,
    Echo(HeaderValue),
}

impl CorsPolicy {
    pub fn builder() -> CorsPolicyBuilder {
        CorsPolicyBuilder::default()
    }

    pub fn allows_credentials(&self) -> bool { self.allow_credentials }

    pub fn allows_method(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Whether `origin` is covered by any configured pattern.
    pub fn allows_origin(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        self.origins.iter().any(|p| *p == OriginPattern::Any || p.matches(&origin))
    }

    fn allow_origin(&self, origin: &HeaderValue) -> Option<AllowOrigin> {
        let lowered = origin.to_str().ok()?.to_ascii_lowercase();
        if self.origins.iter().any(|p| p.matches(&lowered)) {
            return Some(AllowOrigin::Echo(origin.clone()));
        }
        if !self.origins.contains(&OriginPattern::Any) {
            return None;
        }
        // A credentialed response may not carry a literal `*`.
        if self.allow_credentials {
            Some(AllowOrigin::Echo(origin.clone()))
        } else {
            Some(AllowOrigin::Any)
        }
    }

    fn apply_origin(&self, headers: &mut HeaderMap, allow: AllowOrigin) {
        match allow {
            AllowOrigin::Any => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            }
            AllowOrigin::Echo(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.append(VARY, HeaderValue::from_static("Origin"));
            }
        }
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }

    /// Answers a preflight, or returns `None` when it must be forwarded.
    ///
    /// With no allowed headers configured, the headers the browser asked
    /// for are echoed back.
    fn preflight(
        &self,
        origin: &HeaderValue,
        requested: &HeaderValue,
        requested_headers: Option<&HeaderValue>,
    ) -> Option<Response> {
        let allow = self.allow_origin(origin)?;
        let method = requested.to_str().ok()?.trim().parse::<Method>().ok()?;
        if !self.allows_method(method) {
            return None;
        }

        let mut res = Response::status(StatusCode::NO_CONTENT);
        let headers = res.headers_mut();
        self.apply_origin(headers, allow);
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        match (&self.allow_headers, requested_headers) {
            (Some(v), _) => {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v.clone());
            }
            (None, Some(asked)) => {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, asked.clone());
                headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Headers"));
            }
            (None, None) => {}
        }
        if let Some(v) = &self.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, v.clone());
        }
        Some(res)
    }

    /// Adds actual-request headers to `res`, keeping any the handler set.
    fn decorate(&self, res: &mut Response, allow: AllowOrigin) {
        if res.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
            return;
        }
        let headers = res.headers_mut();
        self.apply_origin(headers, allow);
        if let Some(v) = &self.expose_headers {
            headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, v.clone());
        }
    }
}

impl TryFrom<&CorsSettings> for CorsPolicy {
    type Error = Error;

    fn try_from(s: &CorsSettings) -> Result<Self, Error> {
        let mut builder = CorsPolicy::builder()
            .allow_credentials(s.allow_credentials);
        for origin in &s.allowed_origins {
            builder = builder.allow_origin(origin);
        }
        for method in &s.allowed_methods {
            let method = method.trim().to_ascii_uppercase().parse::<Method>()
                .map_err(|e| Error::Config(format!("cors.allowed_methods: {e}")))?;
            builder = builder.allow_method(method);
        }
        for header in &s.allowed_headers {
            builder = builder.allow_header(header);
        }
        for header in &s.exposed_headers {
            builder = builder.expose_header(header);
        }
        // TOML has no null, so `0` is how a config file turns the header off.
        if let Some(secs) = s.max_age_secs.filter(|&secs| secs > 0) {
            builder = builder.max_age(Duration::from_secs(secs));
        }
        builder.build()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`CorsPolicy`]. Validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct CorsPolicyBuilder {
    origins: Vec<String>,
    methods: Vec<Method>,
    headers: Vec<String>,
    exposed: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl CorsPolicyBuilder {
    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.origins.push(origin.to_owned());
        self
    }

    pub fn allow_method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn allow_header(mut self, name: &str) -> Self {
        self.headers.push(name.trim().to_owned());
        self
    }

    pub fn expose_header(mut self, name: &str) -> Self {
        self.exposed.push(name.trim().to_owned());
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn build(self) -> Result<CorsPolicy, Error> {
        let origins = self.origins.iter()
            .map(|o| OriginPattern::parse(o))
            .collect::<Result<Vec<_>, _>>()?;

        let methods = self.methods.iter().map(|m| m.as_str()).collect::<Vec<_>>();
        let allow_methods = header_list("allowed methods", &methods)?
            .unwrap_or_else(|| HeaderValue::from_static(""));

        let max_age = self.max_age
            .map(|d| HeaderValue::from(d.as_secs()));

        Ok(CorsPolicy {
            origins,
            methods: self.methods,
            allow_credentials: self.allow_credentials,
            allow_methods,
            allow_headers: header_list("allowed headers", &self.headers)?,
            expose_headers: header_list("exposed headers", &self.exposed)?,
            max_age,
        })
    }
}

fn header_list<S: AsRef<str>>(what: &str, items: &[S]) -> Result<Option<HeaderValue>, Error> {
    if items.is_empty() {
        return Ok(None);
    }
    let joined = items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined)
        .map(Some)
        .map_err(|_| Error::Config(format!("cors {what} contain invalid characters: `{joined}`")))
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Middleware enforcing a [`CorsPolicy`]. Register it first so it sees every
/// request before routing.
pub struct Cors {
    policy: CorsPolicy,
}

impl Cors {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Middleware for Cors {
    fn name(&self) -> &str { "cors" }

    async fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let Some(origin) = req.headers().get(ORIGIN).cloned() else {
            return next.run(req).await;
        };

        if req.method() == Method::Options {
            if let Some(requested) = req.headers().get(ACCESS_CONTROL_REQUEST_METHOD) {
                let asked = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS);
                if let Some(res) = self.policy.preflight(&origin, requested, asked) {
                    debug!(?origin, ?requested, "cors preflight accepted");
                    return res;
                }
                debug!(?origin, ?requested, "cors preflight not allowed, forwarding");
                return next.run(req).await;
            }
        }

        match self.policy.allow_origin(&origin) {
            Some(allow) => {
                let mut res = next.run(req).await;
                self.policy.decorate(&mut res, allow);
                res
            }
            None => {
                debug!(?origin, "cors origin not allowed");
                next.run(req).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_pattern_requires_a_non_empty_middle() {
        let p = OriginPattern::parse("https://*.example.com").unwrap();
        assert!(p.matches("https://api.example.com"));
        assert!(!p.matches("https://.example.com"));
        assert!(!p.matches("https://example.com"));
        assert!(!p.matches("http://api.example.com"));
    }

    #[test]
    fn origins_compare_case_insensitively() {
        let policy = CorsPolicy::builder()
            .allow_origin("https://App.Example.com")
            .build()
            .unwrap();
        assert!(policy.allows_origin("HTTPS://app.example.COM"));
        assert!(!policy.allows_origin("https://other.example.com"));
    }

    #[test]
    fn two_stars_in_one_pattern_are_rejected() {
        let err = CorsPolicy::builder().allow_origin("https://*.*.com").build();
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn header_lists_are_rendered_once() {
        let policy = CorsPolicy::builder()
            .allow_method(Method::Get)
            .allow_method(Method::Post)
            .allow_method(Method::Get)
            .allow_header("Content-Type")
            .allow_header("Authorization")
            .max_age(Duration::from_secs(600))
            .build()
            .unwrap();

        assert_eq!(policy.allow_methods, "GET, POST");
        assert_eq!(policy.allow_headers.as_ref().unwrap(), "Content-Type, Authorization");
        assert_eq!(policy.max_age.as_ref().unwrap(), "600");
        assert!(policy.expose_headers.is_none());
    }

    #[test]
    fn zero_max_age_in_settings_disables_the_header() {
        let settings = CorsSettings {
            allowed_origins: vec!["*".into()],
            allowed_methods: vec!["GET".into()],
            max_age_secs: Some(0),
            ..CorsSettings::default()
        };
        let policy = CorsPolicy::try_from(&settings).unwrap();
        assert!(policy.max_age.is_none());

        let origin = HeaderValue::from_static("https://a.dev");
        let res = policy.preflight(&origin, &HeaderValue::from_static("GET"), None).unwrap();
        assert!(!res.headers().contains_key(ACCESS_CONTROL_MAX_AGE));
    }

    #[test]
    fn requested_headers_are_echoed_only_when_none_are_configured() {
        let origin = HeaderValue::from_static("https://a.dev");
        let get = HeaderValue::from_static("GET");
        let asked = HeaderValue::from_static("x-trace-id, content-type");

        let open = CorsPolicy::builder()
            .allow_origin("*")
            .allow_method(Method::Get)
            .build()
            .unwrap();
        let res = open.preflight(&origin, &get, Some(&asked)).unwrap();
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "x-trace-id, content-type");
        assert!(res.headers().get_all(VARY).iter().any(|v| v == "Access-Control-Request-Headers"));

        let res = open.preflight(&origin, &get, None).unwrap();
        assert!(!res.headers().contains_key(ACCESS_CONTROL_ALLOW_HEADERS));

        let strict = CorsPolicy::builder()
            .allow_origin("*")
            .allow_method(Method::Get)
            .allow_header("Content-Type")
            .build()
            .unwrap();
        let res = strict.preflight(&origin, &get, Some(&asked)).unwrap();
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[test]
    fn settings_with_unknown_method_are_a_config_error() {
        let settings = CorsSettings {
            allowed_methods: vec!["get".into(), "BREW".into()],
            ..CorsSettings::default()
        };
        assert!(matches!(CorsPolicy::try_from(&settings), Err(Error::Config(_))));
    }
}
