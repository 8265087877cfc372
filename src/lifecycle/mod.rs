//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Every accepted routing table (manager.rs):
//!     Start new generation → Settle → Drain previous generation
//!
//! Shutdown (shutdown.rs):
//!     Trigger → providers, throttle, merger stop → live server drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - The listening socket is bound once and never closed mid-run
//! - Shutdown has a timeout: remaining connections are dropped after it

pub mod manager;
pub mod shutdown;
pub mod signals;

pub use manager::{LiveServer, ServerManager, ServerState};
pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
