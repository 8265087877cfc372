//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check referenced files are declared sensibly
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    MaxConnections,

    #[error("listener.tls must list at least one certificate")]
    NoCertificates,

    #[error("reload.channel_capacity must be greater than zero")]
    ChannelCapacity,

    #[error("reload.grace_timeout_secs must be greater than zero")]
    GraceTimeout,

    #[error("timeouts.{0} must be greater than zero")]
    Timeout(&'static str),

    #[error("file.path must not be empty")]
    FilePath,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }
    if let Some(tls) = &config.listener.tls {
        if tls.certificates.is_empty() {
            errors.push(ValidationError::NoCertificates);
        }
    }

    if config.reload.channel_capacity == 0 {
        errors.push(ValidationError::ChannelCapacity);
    }
    if config.reload.grace_timeout_secs == 0 {
        errors.push(ValidationError::GraceTimeout);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Timeout("request_secs"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Timeout("upstream_secs"));
    }

    if let Some(file) = &config.file {
        if file.path.as_os_str().is_empty() {
            errors.push(ValidationError::FilePath);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FileProviderConfig, TlsConfig};

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.tls = Some(TlsConfig::default());
        config.reload.channel_capacity = 0;
        config.file = Some(FileProviderConfig {
            path: "".into(),
            watch: true,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("not-an-address".into()),
                ValidationError::NoCertificates,
                ValidationError::ChannelCapacity,
                ValidationError::FilePath,
            ]
        );
    }
}
