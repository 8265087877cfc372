//! Graceful server manager.
//!
//! # Responsibilities
//! - Start a server generation for every accepted routing table
//! - Retire the previous generation: settle, stop accepting, drain
//! - Track each generation's state
//!
//! # State Transitions
//! ```text
//! Starting → Listening: accept loop running on the shared socket
//! Listening → Draining: graceful shutdown requested
//! Draining → Stopped: in-flight requests done or grace timeout hit
//! ```
//!
//! # Design Decisions
//! - All generations accept from duplicates of one socket
//! - Old and new generations overlap for the settle delay
//! - Connections still open after the grace timeout are closed forcibly

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::ReloadConfig;
use crate::http::{build_app, AppSettings, Forwarder};
use crate::net::{ServeError, SharedListener};
use crate::routing::RoutingTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Draining,
}

#[derive(Debug, Clone)]
struct SharedState(Arc<Mutex<ServerState>>);

impl SharedState {
    fn new(state: ServerState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    fn get(&self) -> ServerState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ServerState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// One running server generation.
#[derive(Debug)]
pub struct LiveServer {
    generation: u64,
    table: Arc<RoutingTable>,
    handle: Handle,
    state: SharedState,
    task: JoinHandle<()>,
}

impl LiveServer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// Stop accepting and wait for in-flight requests, at most `grace`;
    /// connections still open afterwards are closed.
    pub async fn drain(self, grace: Duration) {
        tracing::info!(
            generation = self.generation,
            connections = self.handle.connection_count(),
            grace = ?grace,
            "Draining server"
        );
        self.state.set(ServerState::Draining);
        self.handle.graceful_shutdown(Some(grace));

        let mut task = self.task;
        let drained = tokio::time::timeout(grace, &mut task).await;
        let remaining = self.handle.connection_count();
        if drained.is_err() || remaining > 0 {
            tracing::warn!(
                generation = self.generation,
                connections = remaining,
                "Grace timeout elapsed, closing remaining connections"
            );
            self.handle.shutdown();
        }
        let result = match drained {
            Ok(result) => result,
            Err(_) => task.await,
        };
        if let Err(e) = result {
            tracing::error!(generation = self.generation, error = %e, "Server task failed");
        }
        self.state.set(ServerState::Stopped);
        tracing::info!(generation = self.generation, "Server drained");
    }
}

/// Owns the listening socket and the TLS configuration; starts and
/// retires server generations.
#[derive(Debug)]
pub struct ServerManager {
    listener: SharedListener,
    tls: Option<RustlsConfig>,
    forwarder: Forwarder,
    settings: AppSettings,
    settle: Duration,
    grace: Duration,
}

impl ServerManager {
    pub fn new(
        listener: SharedListener,
        tls: Option<RustlsConfig>,
        forwarder: Forwarder,
        mut settings: AppSettings,
        reload: &ReloadConfig,
    ) -> Self {
        settings.tls = tls.is_some();
        Self {
            listener,
            tls,
            forwarder,
            settings,
            settle: reload.settle(),
            grace: reload.grace_timeout(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn grace_timeout(&self) -> Duration {
        self.grace
    }

    /// Start a new generation serving `table` on the shared socket.
    pub async fn start(&self, table: Arc<RoutingTable>, generation: u64) -> Result<LiveServer, ServeError> {
        let listener = self.listener.handoff()?;
        let app = build_app(Arc::clone(&table), self.forwarder.clone(), &self.settings)
            .into_make_service_with_connect_info::<SocketAddr>();
        let handle = Handle::new();
        let state = SharedState::new(ServerState::Starting);

        let task = match &self.tls {
            Some(tls) => {
                let server = axum_server::from_tcp_rustls(listener, tls.clone()).handle(handle.clone());
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = server.serve(app).await {
                        tracing::error!(generation, error = %e, "Server error");
                    }
                    state.set(ServerState::Stopped);
                })
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = server.serve(app).await {
                        tracing::error!(generation, error = %e, "Server error");
                    }
                    state.set(ServerState::Stopped);
                })
            }
        };

        if handle.listening().await.is_none() {
            return Err(ServeError::Handoff(std::io::Error::other(
                "server exited before accepting connections",
            )));
        }
        state.set(ServerState::Listening);
        tracing::info!(
            generation,
            address = %self.local_addr(),
            frontends = table.len(),
            tls = self.tls.is_some(),
            "Server listening"
        );

        Ok(LiveServer {
            generation,
            table,
            handle,
            state,
            task,
        })
    }

    /// Let a replaced generation finish: wait the settle delay, then drain.
    pub async fn retire(&self, old: LiveServer) {
        tokio::time::sleep(self.settle).await;
        old.drain(self.grace).await;
    }
}
