//! Per-client throttling at the request boundary.
//!
//! Wraps a [`RateLimiter`] as an axum layer: the counting itself lives in
//! `pavilion-core`; this module only derives the client identity from the
//! request and translates the decision into status and advisory headers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use pavilion_core::{RateDecision, RateLimiter};

/// Normalizes the client identity to a single string: the first forwarded
/// address if present, else the peer socket address, else `""`. Callers
/// without any identity deliberately share one bucket.
fn client_identity(req: &Request<Body>) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&req);

    match limiter.check(&identity) {
        RateDecision::Limited {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!("Rate limit exceeded for client: {identity}");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "message": "Rate limit exceeded" })),
            )
                .into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            response
        }
        RateDecision::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<Body> {
        Request::builder().uri("/api/auth/signin").body(Body::empty()).unwrap()
    }

    #[test]
    fn forwarded_header_takes_the_first_address() {
        let mut req = request();
        req.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );

        assert_eq!(client_identity(&req), "203.0.113.7");
    }

    #[test]
    fn single_forwarded_address_is_trimmed() {
        let mut req = request();
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 "));

        assert_eq!(client_identity(&req), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut req = request();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("198.51.100.4:61234".parse().unwrap()));

        assert_eq!(client_identity(&req), "198.51.100.4");
    }

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let mut req = request();
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("198.51.100.4:61234".parse().unwrap()));

        assert_eq!(client_identity(&req), "203.0.113.7");
    }

    #[test]
    fn no_identity_normalizes_to_empty() {
        assert_eq!(client_identity(&request()), "");
    }

    #[test]
    fn blank_forwarded_header_falls_through() {
        let mut req = request();
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("  "));
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("198.51.100.4:61234".parse().unwrap()));

        assert_eq!(client_identity(&req), "198.51.100.4");
    }
}
