//! Static configuration schema.
//!
//! This is the process-level configuration read once at startup. Routing
//! data (frontends, backends) is not part of it; that arrives at runtime
//! from providers, see [`crate::config::dynamic`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the proxy process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Reconciliation and hot-swap timings.
    pub reload: ReloadConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// File provider. Disabled when absent.
    pub file: Option<FileProviderConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Certificate/key pairs. SNI picks among them by host name; the first
    /// one is served to clients that send no SNI.
    pub certificates: Vec<CertificateConfig>,
}

/// One PEM certificate chain and its private key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificateConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// Host names served with this certificate. `*.example.com` matches
    /// any direct subdomain. Empty means the certificate's own DNS
    /// subjectAltNames.
    #[serde(default)]
    pub sni_names: Vec<String>,
}

/// Timings for the provider → router pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Minimum spacing between forwarded provider messages, in milliseconds.
    pub throttle_ms: u64,

    /// Delay between starting a new server and draining the old one.
    pub settle_ms: u64,

    /// How long a retired server may keep serving in-flight requests.
    pub grace_timeout_secs: u64,

    /// Buffer size of the raw and validated configuration channels.
    pub channel_capacity: usize,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 2000,
            settle_ms: 1000,
            grace_timeout_secs: 10,
            channel_capacity: 100,
        }
    }
}

impl ReloadConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout_secs)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for an upstream server to produce response headers.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 25,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }
}

/// File provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileProviderConfig {
    /// Path to a TOML or JSON file holding a dynamic configuration.
    pub path: PathBuf,

    /// Re-read the file whenever it changes on disk.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_watch() -> bool {
    true
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.reload.throttle(), Duration::from_secs(2));
        assert_eq!(config.reload.grace_timeout(), Duration::from_secs(10));
        assert!(config.file.is_none());
    }

    #[test]
    fn parses_tls_and_file_sections() {
        let raw = r#"
            [listener]
            bind_address = "127.0.0.1:8443"

            [[listener.tls.certificates]]
            cert_path = "a.crt"
            key_path = "a.key"

            [[listener.tls.certificates]]
            cert_path = "b.crt"
            key_path = "b.key"

            [reload]
            throttle_ms = 500

            [file]
            path = "dynamic.toml"
        "#;
        let config: ProxyConfig = toml::from_str(raw).unwrap();
        let tls = config.listener.tls.unwrap();
        assert_eq!(tls.certificates.len(), 2);
        assert_eq!(config.reload.throttle_ms, 500);
        assert_eq!(config.reload.settle_ms, 1000);
        let file = config.file.unwrap();
        assert!(file.watch);
        assert_eq!(file.path, PathBuf::from("dynamic.toml"));
    }
}
