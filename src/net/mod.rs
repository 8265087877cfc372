//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     listener.rs (bind once) → tls.rs (optional, built once)
//!
//! Every router build:
//!     listener.rs (duplicate socket) → new server generation
//! ```
//!
//! # Design Decisions
//! - The socket outlives every server that accepts on it
//! - TLS is optional and handled transparently

pub mod listener;
pub mod tls;

use std::net::SocketAddr;
use thiserror::Error;

pub use listener::SharedListener;
pub use tls::{load_tls_config, TlsError};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("listener handoff failed: {0}")]
    Handoff(#[source] std::io::Error),
}
