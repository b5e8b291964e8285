use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;

use super::RateLimiter;

/// Counter key of one caller on one route, inserted into request extensions
/// so the handler can reset it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(caller: &str, path: &str) -> Self {
        Self(format!("{caller}:{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_request(request: &Request) -> Self {
        let caller = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| forwarded_for(request.headers()))
            .unwrap_or_else(|| "unknown".to_string());

        let path = request
            .extensions()
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.path().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        Self::new(&caller, &path)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// only consulted when the server was started without connect info
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}

/// Middleware for `axum::middleware::from_fn_with_state(limiter, throttle)`.
///
/// Every response carries the `x-ratelimit-*` headers; refused attempts get a
/// 429 with `retry-after` and never reach the handler.
pub async fn throttle(
    State(limiter): State<Arc<RateLimiter>>,
    mut request: Request,
    next: Next,
) -> Response {
    let key = RateLimitKey::from_request(&request);
    let decision = limiter.attempt(key.as_str()).await;

    if !decision.allowed {
        tracing::warn!(key = %key, retry_after = decision.retry_after, "rate limit exceeded");
        let mut response = AppError::rate_limited(decision.retry_after).into_response();
        decision.write_headers(response.headers_mut());
        return response;
    }

    request.extensions_mut().insert(key);
    let mut response = next.run(request).await;
    decision.write_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn key_prefers_connect_info() {
        let mut request = Request::builder()
            .uri("/auth/login")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RateLimitKey::from_request(&request).as_str(), "203.0.113.9:/auth/login");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(RateLimitKey::from_request(&request).as_str(), "127.0.0.1:/auth/login");
    }

    #[test]
    fn key_without_address_falls_back_to_unknown() {
        let request = Request::builder().uri("/auth/login").body(Body::empty()).unwrap();
        assert_eq!(RateLimitKey::from_request(&request).to_string(), "unknown:/auth/login");
    }
}
