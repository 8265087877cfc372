//! Backend pool management.
//!
//! # Responsibilities
//! - Build one handler per backend name per router build
//! - Hand the same `Arc<BackendHandler>` to every frontend naming that backend
//! - Wire the configured balancing method and circuit breaker

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Backend;
use crate::load_balancer::{server::Server, LoadBalancer, Method};
use crate::resilience::CircuitBreaker;
use crate::routing::BuildError;

/// Everything needed to serve one backend: servers, balancer, breaker.
#[derive(Debug)]
pub struct BackendHandler {
    name: String,
    servers: Vec<Arc<Server>>,
    method: Method,
    balancer: Box<dyn LoadBalancer>,
    breaker: Option<CircuitBreaker>,
}

impl BackendHandler {
    /// Build a handler from its configuration. Fails on an invalid server
    /// URL or breaker expression.
    pub fn from_config(name: &str, config: &Backend) -> Result<Self, BuildError> {
        let method = Method::from_config(
            name,
            config.load_balancer.as_ref().map(|lb| lb.method.as_str()),
        );

        let mut servers = Vec::with_capacity(config.servers.len());
        for (server_name, server) in &config.servers {
            let server = Server::new(server_name.as_str(), &server.url, server.weight).map_err(
                |source| BuildError::InvalidServer {
                    backend: name.to_string(),
                    server: server_name.clone(),
                    source,
                },
            )?;
            servers.push(Arc::new(server));
        }

        let breaker = config
            .circuit_breaker
            .as_ref()
            .map(|cb| CircuitBreaker::from_config(name, cb))
            .transpose()
            .map_err(|source| BuildError::InvalidBreaker {
                backend: name.to_string(),
                source,
            })?;

        Ok(Self {
            name: name.to_string(),
            servers,
            method,
            balancer: method.balancer(),
            breaker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&Arc<Server>> {
        self.servers.iter().find(|s| s.name() == name)
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Select the next server to forward to.
    pub fn next_server(&self) -> Option<Arc<Server>> {
        let server = self.balancer.next_server(&self.servers);
        if server.is_none() {
            tracing::debug!(backend = %self.name, "Backend has no servers");
        }
        server
    }

    /// Protocol upgrades are tunnelled directly for plain weighted round robin.
    pub fn tunnels_upgrades(&self) -> bool {
        self.method == Method::Wrr
    }
}

/// Per-build registry of backend handlers.
#[derive(Debug, Default)]
pub struct BackendPool {
    handlers: HashMap<String, Arc<BackendHandler>>,
}

impl BackendPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handler for `name`, building it on first use.
    pub fn get_or_create(
        &mut self,
        name: &str,
        config: &Backend,
    ) -> Result<Arc<BackendHandler>, BuildError> {
        if let Some(handler) = self.handlers.get(name) {
            return Ok(Arc::clone(handler));
        }
        let handler = Arc::new(BackendHandler::from_config(name, config)?);
        self.handlers.insert(name.to_string(), Arc::clone(&handler));
        Ok(handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
