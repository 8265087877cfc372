//! Hot-swapping reverse proxy.
//!
//! Routing configuration arrives at runtime from any number of providers.
//! Snapshots are throttled, merged, compiled into a routing table and
//! served by a fresh server generation on the same socket, while the
//! previous generation drains its in-flight requests.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────┐   ┌──────────┐   ┌────────┐   ┌────────────────┐
//!   │ provider │──▶│ throttle │──▶│ merger │──▶│ server manager │──▶ socket
//!   └──────────┘   └──────────┘   └───┬────┘   └────────────────┘
//!                                     │
//!                       ┌─────────────┴─────────────┐
//!                       ▼                           ▼
//!                 ┌───────────┐             ┌──────────────┐
//!                 │  routing  │             │load_balancer │
//!                 │rules+table│             │ wrr/drr + cb │
//!                 └───────────┘             └──────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Traffic management
pub mod load_balancer;
pub mod resilience;

// Dynamic configuration
pub mod provider;
pub mod reconcile;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use reconcile::Engine;
