//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, method, headers)
//!     → router.rs (frontend lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched frontend or no match
//!
//! Route Compilation (on every accepted configuration):
//!     Configurations (one per provider)
//!     → builder.rs (merge, resolve backends)
//!     → rules.rs (compile rule strings into matchers)
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Tables compiled off the request path, immutable once built
//! - Deterministic: same input always matches same frontend
//! - First match wins (ordered by priority, then name)

pub mod builder;
pub mod matcher;
pub mod router;
pub mod rules;

pub use builder::{build_router, BuildError};
pub use router::{CompiledFrontend, RoutingTable};
pub use rules::RuleError;
