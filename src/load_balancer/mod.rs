//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Frontend matched → BackendHandler identified
//!     → circuit breaker admission (if configured)
//!     → Apply load balancing algorithm:
//!         - wrr.rs (interleaved weighted round robin)
//!         - rebalancer.rs (wrr with latency/failure feedback)
//!     → server.rs (track in-flight request, record outcome)
//! ```
//!
//! # Design Decisions
//! - One handler per backend name per build, shared by all frontends
//! - Algorithm selection per backend
//! - Servers are never removed by the balancer, only down-weighted

pub mod pool;
pub mod rebalancer;
pub mod server;
pub mod wrr;

use std::fmt::Debug;
use std::sync::Arc;

pub use pool::{BackendHandler, BackendPool};
pub use server::Server;

/// Strategy for picking the next server of a backend.
pub trait LoadBalancer: Send + Sync + Debug {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Wrr,
    Drr,
}

impl Method {
    /// Resolve a configured method name; unknown names fall back to wrr.
    pub fn from_config(backend: &str, method: Option<&str>) -> Self {
        match method.map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("wrr") => Method::Wrr,
            Some("drr") => Method::Drr,
            Some(other) => {
                tracing::warn!(backend = %backend, method = %other, "Unknown load balancing method, using wrr");
                Method::Wrr
            }
        }
    }

    pub fn balancer(self) -> Box<dyn LoadBalancer> {
        match self {
            Method::Wrr => Box::new(wrr::WeightedRoundRobin::new()),
            Method::Drr => Box::new(rebalancer::Rebalancer::default()),
        }
    }
}
