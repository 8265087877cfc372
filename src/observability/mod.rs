//! Logs and metrics.
//!
//! ```text
//! reconcile (applied / rejected builds) ─┐
//! http (per-request status, latency)    ─┼─→ metrics.rs → Prometheus exporter (optional)
//! resilience (breaker trips)            ─┘
//!
//! every task ─→ tracing events ─→ logging.rs (EnvFilter + fmt to stdout)
//! ```
//!
//! Each proxied request runs inside a span carrying its request ID.

pub mod logging;
pub mod metrics;
