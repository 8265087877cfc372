//! Upstream forwarding.
//!
//! # Responsibilities
//! - Ask the backend's circuit breaker and balancer for a server
//! - Rewrite the request for the chosen server (URI, Host, prefixes)
//! - Set `X-Forwarded-*` headers and strip hop-by-hop headers
//! - Send with an upstream timeout and feed the outcome back
//!
//! # Design Decisions
//! - No retries: a failed attempt is reported as is
//! - Bodies stream through in both directions
//! - Upstream connections are always HTTP/1.1

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::http::response::{sanitize_response_headers, ProxyError};
use crate::http::websocket;
use crate::load_balancer::Server;
use crate::resilience::{Admission, Outcome};
use crate::routing::CompiledFrontend;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_PREFIX: HeaderName = HeaderName::from_static("x-forwarded-prefix");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Facts about the client connection needed for forwarding headers.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext {
    pub client_addr: Option<SocketAddr>,
    /// "http" or "https".
    pub proto: &'static str,
}

/// Remove the first matching prefix. The result always starts with `/`.
fn strip_path_prefix<'a>(path: &str, prefixes: &'a [String]) -> (String, Option<&'a str>) {
    for prefix in prefixes {
        if let Some(rest) = path.strip_prefix(prefix.as_str()) {
            let rest = if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            };
            return (rest, Some(prefix.as_str()));
        }
    }
    (path.to_string(), None)
}

/// Rewrite a client request into the request sent to `server`.
pub fn prepare_request(
    req: Request<Body>,
    frontend: &CompiledFrontend,
    server: &Server,
    ctx: &ForwardContext,
    upgrade: bool,
) -> Result<Request<Body>, ProxyError> {
    let (mut parts, body) = req.into_parts();

    let original_host = parts
        .headers
        .get(header::HOST)
        .cloned()
        .or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

    let (path, stripped) = strip_path_prefix(parts.uri.path(), &frontend.strip_prefixes);
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    parts.uri = Uri::builder()
        .scheme(server.scheme())
        .authority(server.authority().clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
    parts.version = Version::HTTP_11;

    let upgrade_protocol = if upgrade {
        parts.headers.get(header::UPGRADE).cloned()
    } else {
        None
    };
    strip_hop_by_hop(&mut parts.headers);
    if let Some(protocol) = upgrade_protocol {
        parts
            .headers
            .insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        parts.headers.insert(header::UPGRADE, protocol);
    }

    let headers = &mut parts.headers;
    if let Some(prefix) = stripped.and_then(|p| HeaderValue::from_str(p).ok()) {
        headers.insert(X_FORWARDED_PREFIX, prefix);
    }
    if let Some(host) = &original_host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(ctx.proto));
    if let Some(addr) = ctx.client_addr {
        let ip = addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(previous) => format!("{previous}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if frontend.pass_host_header {
        if let Some(host) = original_host {
            headers.insert(header::HOST, host);
        }
    } else {
        let authority = HeaderValue::from_str(server.authority().as_str())
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
        headers.insert(header::HOST, authority);
    }

    Ok(Request::from_parts(parts, body))
}

/// Sends requests to upstream servers. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl Forwarder {
    pub fn new(upstream_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            upstream_timeout,
        }
    }

    /// Forward `req` to the backend of `frontend`.
    pub async fn forward(
        &self,
        frontend: &CompiledFrontend,
        mut req: Request<Body>,
        ctx: &ForwardContext,
    ) -> Result<Response<Body>, ProxyError> {
        let backend = &frontend.backend;

        if let Some(breaker) = backend.breaker() {
            if breaker.admit() == Admission::Fallback {
                return Err(ProxyError::BreakerOpen(backend.name().to_string()));
            }
        }

        let server = backend
            .next_server()
            .ok_or_else(|| ProxyError::NoServer(backend.name().to_string()))?;

        let upgrade = backend.tunnels_upgrades() && websocket::is_upgrade_request(&req);
        let client_upgrade = upgrade.then(|| hyper::upgrade::on(&mut req));
        let upstream = prepare_request(req, frontend, &server, ctx, upgrade)?;

        tracing::debug!(
            frontend = %frontend.name,
            backend = %backend.name(),
            server = %server.name(),
            uri = %upstream.uri(),
            "Forwarding request"
        );

        let _guard = server.start_request();
        let start = Instant::now();
        let result = tokio::time::timeout(self.upstream_timeout, self.client.request(upstream)).await;
        let latency = start.elapsed();

        let outcome = match &result {
            Ok(Ok(response)) => Outcome::response(response.status().as_u16(), latency),
            _ => Outcome::network_error(latency),
        };
        server.record(latency, outcome.status.map_or(true, |s| s >= 500));
        if let Some(breaker) = backend.breaker() {
            breaker.record(outcome);
        }

        match result {
            Ok(Ok(mut response)) => {
                if let Some(client_upgrade) = client_upgrade {
                    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                        let upstream_upgrade = hyper::upgrade::on(&mut response);
                        websocket::spawn_tunnel(client_upgrade, upstream_upgrade, server.name().to_string());
                        return Ok(response.map(Body::new));
                    }
                }
                sanitize_response_headers(response.headers_mut());
                Ok(response.map(Body::new))
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %backend.name(), server = %server.name(), error = %e, "Upstream error");
                Err(ProxyError::Upstream(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(backend = %backend.name(), server = %server.name(), timeout = ?self.upstream_timeout, "Upstream timed out");
                Err(ProxyError::UpstreamTimeout(self.upstream_timeout))
            }
        }
    }
}
