//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit or serve fallback)
//!     → forward upstream
//!     → window.rs (record latency, status, network errors)
//!     → expression.rs (evaluate trip condition over the window)
//! ```
//!
//! # Design Decisions
//! - Trip conditions are data (parsed expressions), not code
//! - Fail fast in Tripped state (no waiting for timeout)
//! - Metrics are windowed so old failures age out

pub mod circuit_breaker;
pub mod expression;
pub mod window;

pub use circuit_breaker::{Admission, BreakerState, CircuitBreaker};
pub use window::Outcome;
