//! The reconciliation engine.
//!
//! Owns every piece of mutable state: the listening socket (through the
//! server manager), the accepted configurations, the live server and the
//! background tasks.
//!
//! ```text
//! providers ─┐
//!            ├─ raw channel ─→ Throttle ─→ validated channel ─→ Merger ─→ ServerManager
//! sender() ──┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ConfigMessage, Configurations, ProxyConfig};
use crate::http::{AppSettings, Forwarder};
use crate::lifecycle::{ServerManager, Shutdown};
use crate::net::{load_tls_config, ServeError, SharedListener};
use crate::provider::Provider;
use crate::reconcile::merger::{lock, EngineState, Merger, SharedEngineState};
use crate::reconcile::throttle::Throttle;
use crate::routing::RoutingTable;

#[derive(Debug)]
pub struct Engine {
    state: SharedEngineState,
    manager: Arc<ServerManager>,
    shutdown: Arc<Shutdown>,
    raw_tx: mpsc::Sender<ConfigMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Bind the listener, start serving an empty router, and spawn the
    /// provider, throttle and merger tasks.
    pub async fn start(config: &ProxyConfig, providers: Vec<Arc<dyn Provider>>) -> Result<Self, ServeError> {
        let listener = SharedListener::bind(&config.listener)?;
        let tls = config
            .listener
            .tls
            .as_ref()
            .map(load_tls_config)
            .transpose()?;

        let settings = AppSettings {
            request_timeout: config.timeouts.request(),
            max_in_flight: config.listener.max_connections,
            tls: tls.is_some(),
        };
        let manager = Arc::new(ServerManager::new(
            listener,
            tls,
            Forwarder::new(config.timeouts.upstream()),
            settings,
            &config.reload,
        ));

        let initial = manager.start(Arc::new(RoutingTable::default()), 0).await?;
        let state: SharedEngineState = Arc::new(std::sync::Mutex::new(EngineState {
            live: Some(initial),
            ..Default::default()
        }));

        let shutdown = Arc::new(Shutdown::new());
        let capacity = config.reload.channel_capacity.max(1);
        let (raw_tx, raw_rx) = mpsc::channel(capacity);
        let (validated_tx, validated_rx) = mpsc::channel(capacity);

        let mut tasks = Vec::with_capacity(providers.len() + 2);
        tasks.push(tokio::spawn(
            Throttle::new(config.reload.throttle()).run(raw_rx, validated_tx, shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Merger::new(Arc::clone(&state), Arc::clone(&manager)).run(validated_rx, shutdown.subscribe()),
        ));

        for provider in providers {
            let tx = raw_tx.clone();
            let stop = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                tracing::info!(provider = %provider.name(), "Starting provider");
                match provider.provide(tx, stop).await {
                    Ok(()) => tracing::info!(provider = %provider.name(), "Provider finished"),
                    Err(e) => tracing::error!(provider = %provider.name(), error = %e, "Provider failed"),
                }
            }));
        }

        Ok(Self {
            state,
            manager,
            shutdown,
            raw_tx,
            tasks,
        })
    }

    /// Channel accepting provider messages, for embedders and tests.
    pub fn sender(&self) -> mpsc::Sender<ConfigMessage> {
        self.raw_tx.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.manager.local_addr()
    }

    /// Number of successful router swaps.
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Snapshot of the accepted configurations.
    pub fn accepted(&self) -> Configurations {
        lock(&self.state).accepted.clone()
    }

    /// The routing table currently serving traffic.
    pub fn routing_table(&self) -> Option<Arc<RoutingTable>> {
        lock(&self.state).live.as_ref().map(|live| Arc::clone(live.table()))
    }

    /// Stop every task, then drain the live server within the grace timeout.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Task failed during shutdown");
            }
        }
        let live = lock(&self.state).live.take();
        if let Some(live) = live {
            live.drain(self.manager.grace_timeout()).await;
        }
        tracing::info!("Engine stopped");
    }
}
