//! CORS handling for the HTTP server.
//!
//! Only installed when `--allow-origin` was given. Origins in the
//! allow-list get `Access-Control-Allow-Origin` echoing the origin; `*` in
//! the list matches any origin. Preflight requests are answered here and
//! never reach a backend route.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>) -> Self {
        Self { origins }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o == origin)
    }
}

pub async fn cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allowed = origin.as_deref().is_some_and(|o| policy.allows(o));

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        if allowed {
            apply_headers(&mut response, origin.as_deref().unwrap_or_default());
        }
        return response;
    }

    let mut response = next.run(request).await;
    if allowed {
        apply_headers(&mut response, origin.as_deref().unwrap_or_default());
    }
    response
}

fn apply_headers(response: &mut Response, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_origin_match() {
        let policy = CorsPolicy::new(vec!["https://ex.com".to_string()]);
        assert!(policy.allows("https://ex.com"));
        assert!(!policy.allows("https://other.com"));
    }

    #[test]
    fn wildcard_matches_everything() {
        let policy = CorsPolicy::new(vec!["*".to_string()]);
        assert!(policy.allows("https://anything.example"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let policy = CorsPolicy::new(vec![]);
        assert!(!policy.allows("https://ex.com"));
    }
}
