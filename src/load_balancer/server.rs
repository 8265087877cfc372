//! Upstream server abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream target of a backend
//! - Hold its declared weight and the rebalancer's multiplier
//! - Track active requests and per-interval latency/failure counters

use axum::http::uri::{Authority, Scheme};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Weight used when a server declares 0.
pub const DEFAULT_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerUrlError {
    #[error("invalid URL `{url}`: {reason}")]
    Invalid { url: String, reason: String },

    #[error("unsupported scheme `{scheme}` in `{url}` (only http is forwarded)")]
    UnsupportedScheme { url: String, scheme: String },
}

/// Counters accumulated since the last rebalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalStats {
    pub requests: u64,
    pub failures: u64,
    pub latency_micros: u64,
}

impl IntervalStats {
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.failures as f64 / self.requests as f64
    }

    pub fn mean_latency(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency_micros / self.requests)
    }
}

/// A single upstream server.
#[derive(Debug)]
pub struct Server {
    name: String,
    url: Url,
    authority: Authority,
    weight: AtomicU32,
    multiplier: AtomicU32,
    active_requests: AtomicUsize,
    requests: AtomicU64,
    failures: AtomicU64,
    latency_micros: AtomicU64,
}

impl Server {
    /// Parse `url` and create a server. Only `http` URLs are accepted.
    pub fn new(name: impl Into<String>, url: &str, weight: u32) -> Result<Self, ServerUrlError> {
        let parsed = Url::parse(url).map_err(|e| ServerUrlError::Invalid {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" {
            return Err(ServerUrlError::UnsupportedScheme {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        let host = parsed.host_str().ok_or_else(|| ServerUrlError::Invalid {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = parsed.port_or_known_default().unwrap_or(80);
        let authority =
            Authority::from_str(&format!("{}:{}", host, port)).map_err(|e| ServerUrlError::Invalid {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.into(),
            url: parsed,
            authority,
            weight: AtomicU32::new(normalize_weight(weight)),
            multiplier: AtomicU32::new(1),
            active_requests: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        Scheme::HTTP
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Declared weight (never 0).
    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    pub fn set_weight(&self, weight: u32) {
        self.weight.store(normalize_weight(weight), Ordering::Relaxed);
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier.load(Ordering::Relaxed)
    }

    pub fn set_multiplier(&self, multiplier: u32) {
        self.multiplier.store(multiplier.max(1), Ordering::Relaxed);
    }

    /// Weight actually used for selection.
    pub fn effective_weight(&self) -> u32 {
        self.weight().saturating_mul(self.multiplier())
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Mark a request in flight until the guard drops.
    pub fn start_request(self: &Arc<Self>) -> RequestGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            server: Arc::clone(self),
        }
    }

    pub fn record(&self, latency: Duration, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Read and reset the interval counters.
    pub fn take_stats(&self) -> IntervalStats {
        IntervalStats {
            requests: self.requests.swap(0, Ordering::Relaxed),
            failures: self.failures.swap(0, Ordering::Relaxed),
            latency_micros: self.latency_micros.swap(0, Ordering::Relaxed),
        }
    }
}

fn normalize_weight(weight: u32) -> u32 {
    if weight == 0 {
        DEFAULT_WEIGHT
    } else {
        weight
    }
}

/// A RAII guard that manages the active request count.
#[derive(Debug)]
pub struct RequestGuard {
    server: Arc<Server>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.server.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}
