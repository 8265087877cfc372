//! Configuration providers.
//!
//! # Data Flow
//! ```text
//! External source (file, ...)
//!     → Provider::provide (own task)
//!     → ConfigMessage { provider_name, Option<Configuration> }
//!     → raw channel → reconcile::throttle
//! ```
//!
//! # Design Decisions
//! - Every provider emits whole snapshots, never diffs
//! - A failing provider only stops itself; others keep running
//! - Providers stop when the shutdown signal fires

pub mod file;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::ConfigMessage;

pub use file::FileProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("file watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("configuration channel closed")]
    ChannelClosed,
}

/// A source of routing configuration.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique name; keys this provider's accepted configuration.
    fn name(&self) -> &str;

    /// Emit snapshots on `tx` until the source ends or `shutdown` fires.
    async fn provide(
        &self,
        tx: mpsc::Sender<ConfigMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ProviderError>;
}
