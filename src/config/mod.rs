//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Static (process) configuration:
//!     config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! Dynamic (routing) configuration:
//!     providers emit ConfigMessage { provider_name, Configuration }
//!     → reconcile::throttle (coalesce bursts)
//!     → reconcile::merger (merge per provider, compile, swap)
//! ```
//!
//! # Design Decisions
//! - Both kinds of config are immutable once loaded; changes replace them
//! - All static fields have defaults to allow minimal configs
//! - Dynamic snapshots use ordered maps so merges are deterministic

pub mod dynamic;
pub mod loader;
pub mod schema;
pub mod validation;

pub use dynamic::{
    Backend, CircuitBreakerConfig, ConfigMessage, Configuration, Configurations, Frontend,
    LoadBalancerConfig, Route, Server,
};
pub use loader::{load_config, ConfigError};
pub use schema::{
    CertificateConfig, FileProviderConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    ReloadConfig, TimeoutConfig, TlsConfig,
};
