//! Rate limiting middleware using governor and `tower_governor`.
//!
//! Provides configurable rate limiters for different endpoint categories:
//! - `auth_rate_limiter`: Strict limits for `/register`, `/authraw` and `/renewauth`
//! - `api_rate_limiter`: Relaxed limits for recognition and item routes

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request, StatusCode, header},
    response::Response,
};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

use bestby_core::StatusDesc;

use crate::error::envelope_response;

// =============================================================================
// Client IP Key Extractor
// =============================================================================

/// Key extractor keyed on the connection's peer address.
///
/// `X-Forwarded-For` and `X-Real-IP` are honoured only when the peer is a
/// loopback address, i.e. a reverse proxy on the same host. Any other peer
/// is keyed on its own address whatever headers it sends.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        if !peer.is_loopback() {
            return Ok(peer);
        }

        Ok(forwarded_ip(req.headers()).unwrap_or(peer))
    }
}

/// Client address claimed by a local reverse proxy.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // First hop of X-Forwarded-For
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
/// Password guessing against `/authraw` is throttled by this limiter.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(6)` and `burst_size(5)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6) // Replenish 1 token every 6 seconds (~10/minute)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Create rate limiter for recognition endpoints: ~60 requests per minute per IP.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(1)` and `burst_size(20)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(1)
        .burst_size(20)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(20) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Rewrite the limiter's plain-text rejections as `429 RATE_LIMITED`
/// envelopes, keeping its `retry-after` and `x-ratelimit-*` headers.
pub async fn rate_limit_envelope(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let mut envelope = envelope_response(429, StatusDesc::RateLimited, ());
    for (name, value) in response.headers() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            envelope.headers_mut().insert(name.clone(), value.clone());
        }
    }
    envelope
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request() -> axum::http::request::Builder {
        Request::builder().uri("/authraw")
    }

    fn from_peer(peer: &str) -> axum::http::request::Builder {
        let mut builder = request();
        builder
            .extensions_mut()
            .unwrap()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        builder
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_local_proxy_forwarded_for_takes_first_hop() {
        let req = from_peer("127.0.0.1:40000")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(ClientIpKeyExtractor.extract(&req).unwrap(), ip("203.0.113.7"));
    }

    #[test]
    fn test_local_proxy_real_ip() {
        let req = from_peer("[::1]:40000")
            .header("x-real-ip", "203.0.113.9")
            .body(())
            .unwrap();
        assert_eq!(ClientIpKeyExtractor.extract(&req).unwrap(), ip("203.0.113.9"));
    }

    #[test]
    fn test_local_peer_without_headers_is_keyed_on_itself() {
        let req = from_peer("127.0.0.1:40000").body(()).unwrap();
        assert_eq!(ClientIpKeyExtractor.extract(&req).unwrap(), ip("127.0.0.1"));
    }

    #[test]
    fn test_remote_peer_headers_are_ignored() {
        let req = from_peer("198.51.100.2:4000")
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .unwrap();
        assert_eq!(ClientIpKeyExtractor.extract(&req).unwrap(), ip("198.51.100.2"));
    }

    #[test]
    fn test_no_peer_address_is_an_error() {
        let req = request()
            .header("x-forwarded-for", "203.0.113.7")
            .body(())
            .unwrap();
        assert!(ClientIpKeyExtractor.extract(&req).is_err());
    }

    #[tokio::test]
    async fn test_rate_limit_envelope() {
        let limited = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header("retry-after", "6")
            .body(axum::body::Body::from("Too Many Requests! Wait for 6s"))
            .unwrap();

        let response = rate_limit_envelope(limited).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "6");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["STATUS_DESC"], "RATE_LIMITED");
    }
}
