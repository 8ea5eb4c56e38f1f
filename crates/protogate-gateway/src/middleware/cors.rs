//! CORS for browser clients of the gateway

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// CORS configuration
///
/// Methods and headers requested by a preflight are echoed back, so only
/// origins are restricted.
#[derive(Clone, Debug, PartialEq)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<String>,
    /// Allow cookies and authorization headers
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds
    pub max_age: Option<u64>,
}

impl CorsConfig {
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allows_any() || self.allowed_origins.iter().any(|o| o == origin)
    }

    /// Value of `Access-Control-Allow-Origin` for `origin`, if allowed.
    /// A wildcard is echoed as the origin when credentials are allowed.
    fn allow_origin(&self, origin: &str) -> Option<HeaderValue> {
        if !self.is_origin_allowed(origin) {
            return None;
        }
        if self.allows_any() && !self.allow_credentials {
            return Some(HeaderValue::from_static("*"));
        }
        HeaderValue::from_str(origin).ok()
    }

    fn apply(&self, headers: &mut HeaderMap, origin: &str) {
        let Some(allow_origin) = self.allow_origin(origin) else {
            return;
        };
        if allow_origin != "*" {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn preflight(&self, request: &HeaderMap, origin: &str) -> Response {
        if !self.is_origin_allowed(origin) {
            return (StatusCode::BAD_REQUEST, "Disallowed CORS origin").into_response();
        }

        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        self.apply(headers, origin);

        let methods = request
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE"));
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        if let Some(requested) = request.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        if let Some(max_age) = self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(max_age));
        }
        response
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            max_age: Some(600),
        }
    }
}

/// `axum::middleware::from_fn_with_state` handler
pub async fn cors(State(config): State<Arc<CorsConfig>>, request: Request, next: Next) -> Response {
    let Some(origin) = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(request).await;
    };

    if request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    {
        return config.preflight(request.headers(), &origin);
    }

    let mut response = next.run(request).await;
    config.apply(response.headers_mut(), &origin);
    response
}
