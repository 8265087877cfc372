//! Configuration merger.
//!
//! The single consumer of throttled provider messages. For each message
//! it decides whether anything changed, compiles a router from the
//! accepted configurations with the new one swapped in, and hands the
//! result to the server manager. A failed build leaves every piece of
//! accepted state untouched.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::config::{ConfigMessage, Configurations};
use crate::lifecycle::{LiveServer, ServerManager};
use crate::net::ServeError;
use crate::observability::metrics;
use crate::routing::{build_router, BuildError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to start server: {0}")]
    Serve(#[from] ServeError),
}

/// What happened to one provider message.
#[derive(Debug)]
pub enum MergeOutcome {
    /// Empty or unchanged configuration.
    Skipped,
    /// A new router is live.
    Applied { generation: u64 },
    /// The configuration was discarded; the previous router keeps serving.
    Rejected(MergeError),
}

/// Accepted configurations and the server built from them.
#[derive(Debug, Default)]
pub struct EngineState {
    pub accepted: Configurations,
    pub live: Option<LiveServer>,
    /// Number of successful swaps.
    pub generation: u64,
}

pub type SharedEngineState = Arc<Mutex<EngineState>>;

pub(crate) fn lock(state: &SharedEngineState) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct Merger {
    state: SharedEngineState,
    manager: Arc<ServerManager>,
}

impl Merger {
    pub fn new(state: SharedEngineState, manager: Arc<ServerManager>) -> Self {
        Self { state, manager }
    }

    /// Process one message to completion, including draining the
    /// replaced server.
    pub async fn apply(&self, msg: ConfigMessage) -> MergeOutcome {
        let provider = msg.provider_name;
        let Some(configuration) = msg.configuration else {
            tracing::debug!(provider = %provider, "Skipping empty configuration");
            return MergeOutcome::Skipped;
        };

        let (candidate, generation) = {
            let state = lock(&self.state);
            if state.accepted.get(&provider) == Some(&configuration) {
                tracing::info!(provider = %provider, "Skipping same configuration");
                return MergeOutcome::Skipped;
            }
            let mut candidate = state.accepted.clone();
            candidate.insert(provider.clone(), configuration);
            (candidate, state.generation + 1)
        };

        let table = match build_router(&candidate) {
            Ok(table) => Arc::new(table),
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Rejected configuration");
                metrics::record_config_reload(false);
                return MergeOutcome::Rejected(e.into());
            }
        };

        let server = match self.manager.start(table, generation).await {
            Ok(server) => server,
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Failed to start server for new configuration");
                metrics::record_config_reload(false);
                return MergeOutcome::Rejected(e.into());
            }
        };

        let previous = {
            let mut state = lock(&self.state);
            state.accepted = candidate;
            state.generation = generation;
            state.live.replace(server)
        };
        metrics::record_config_reload(true);
        tracing::info!(provider = %provider, generation, "Configuration applied");

        if let Some(previous) = previous {
            self.manager.retire(previous).await;
        }
        MergeOutcome::Applied { generation }
    }

    /// Apply messages from `rx` one at a time until it closes or
    /// `shutdown` fires. Shutdown wins over queued messages.
    pub async fn run(self, mut rx: mpsc::Receiver<ConfigMessage>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        self.apply(msg).await;
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Merger stopped");
    }
}
