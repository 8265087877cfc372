//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Map proxy failures to HTTP status codes
//! - Strip hop-by-hop headers from upstream responses
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Upstream timeouts result in 504 Gateway Timeout
//! - Transport failures result in 502 Bad Gateway

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::http::forward::strip_hop_by_hop;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no frontend matches the request")]
    NoRoute,

    #[error("backend `{0}` is unavailable")]
    BreakerOpen(String),

    #[error("backend `{0}` has no servers")]
    NoServer(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("cannot build upstream request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoRoute => StatusCode::NOT_FOUND,
            ProxyError::BreakerOpen(_) | ProxyError::NoServer(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Clean up upstream response headers before they reach the client.
pub fn sanitize_response_headers(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::NoRoute.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ProxyError::BreakerOpen("b".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::Upstream("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::UpstreamTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn into_response_carries_status() {
        let response = ProxyError::NoRoute.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
