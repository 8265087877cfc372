//! HTTP application setup.
//!
//! # Responsibilities
//! - Create the Axum Router serving one routing table
//! - Wire up middleware (tracing, timeouts, in-flight limit, request ID)
//! - Dispatch every request to the matched frontend's backend

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::forward::{ForwardContext, Forwarder};
use crate::http::request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::routing::RoutingTable;

/// Settings shared by every generation of the application.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub tls: bool,
}

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub table: Arc<RoutingTable>,
    pub forwarder: Forwarder,
    pub proto: &'static str,
}

/// Build the Axum application serving `table`.
#[allow(deprecated)]
pub fn build_app(table: Arc<RoutingTable>, forwarder: Forwarder, settings: &AppSettings) -> Router {
    let state = AppState {
        table,
        forwarder,
        proto: if settings.tls { "https" } else { "http" },
    };
    let in_flight = Arc::new(Semaphore::new(settings.max_in_flight));

    Router::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(middleware::from_fn_with_state(in_flight, limit_in_flight))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                request_id = %req.request_id(),
            )
        }))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

/// Reject requests beyond the configured number in flight.
async fn limit_in_flight(State(permits): State<Arc<Semaphore>>, req: Request, next: Next) -> Response {
    match permits.try_acquire_owned() {
        Ok(_permit) => next.run(req).await,
        Err(_) => {
            tracing::warn!("In-flight request limit reached");
            (StatusCode::SERVICE_UNAVAILABLE, "Too many requests in flight").into_response()
        }
    }
}

/// Main proxy handler.
/// Looks up the frontend and forwards to its backend.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(frontend) = state.table.match_request(&request) else {
        tracing::debug!(
            request_id = %request.request_id(),
            path = %request.uri().path(),
            "No frontend matched"
        );
        metrics::record_request("none", StatusCode::NOT_FOUND.as_u16(), start);
        return ProxyError::NoRoute.into_response();
    };

    let ctx = ForwardContext {
        client_addr,
        proto: state.proto,
    };
    let response = match state.forwarder.forward(frontend, request, &ctx).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    metrics::record_request(&frontend.name, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configurations;
    use crate::routing::build_router;
    use tower::ServiceExt;

    fn settings() -> AppSettings {
        AppSettings {
            request_timeout: Duration::from_secs(5),
            max_in_flight: 16,
            tls: false,
        }
    }

    #[tokio::test]
    async fn empty_table_returns_404_with_request_id() {
        let table = Arc::new(build_router(&Configurations::new()).unwrap());
        let app = build_app(table, Forwarder::new(Duration::from_secs(1)), &settings());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn client_request_id_is_kept() {
        let table = Arc::new(RoutingTable::default());
        let app = build_app(table, Forwarder::new(Duration::from_secs(1)), &settings());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "req-42");
    }
}
