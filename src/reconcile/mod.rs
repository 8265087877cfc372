//! Dynamic configuration reconciliation.
//!
//! # Data Flow
//! ```text
//! ConfigMessage (any provider)
//!     → throttle.rs (coalesce bursts, one forward per window)
//!     → merger.rs (skip unchanged, merge, build router)
//!     → lifecycle::manager (start new server, drain old one)
//! ```
//!
//! # Design Decisions
//! - One task per stage, connected by bounded channels
//! - Builds are serialized: the merger is the only writer of accepted state
//! - The engine lock is never held across an await

pub mod engine;
pub mod merger;
pub mod throttle;

pub use engine::Engine;
pub use merger::{EngineState, MergeError, MergeOutcome, Merger};
pub use throttle::Throttle;
