//! Shared listening socket.
//!
//! # Responsibilities
//! - Bind the configured address once, at startup
//! - Hand a duplicate of the socket to every server generation
//!
//! The socket is never closed while the process runs, so there is no
//! window in which connections are refused during a swap. Old and new
//! servers may accept from it concurrently until the old one drains.

use std::net::{SocketAddr, TcpListener};

use crate::config::ListenerConfig;
use crate::net::ServeError;

#[derive(Debug)]
pub struct SharedListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl SharedListener {
    /// Bind to the configured address.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ServeError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ServeError::InvalidAddress(config.bind_address.clone()))?;

        let inner = TcpListener::bind(addr).map_err(|source| ServeError::Bind { addr, source })?;
        inner.set_nonblocking(true).map_err(ServeError::Handoff)?;
        let local_addr = inner.local_addr().map_err(ServeError::Handoff)?;

        tracing::info!(address = %local_addr, "Listener bound");
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A duplicate of the socket for a new server generation.
    pub fn handoff(&self) -> Result<TcpListener, ServeError> {
        let listener = self.inner.try_clone().map_err(ServeError::Handoff)?;
        listener.set_nonblocking(true).map_err(ServeError::Handoff)?;
        Ok(listener)
    }
}
