//! Dynamic routing configuration produced by providers.
//!
//! A [`Configuration`] is a complete snapshot. Providers replace it
//! wholesale; nothing downstream patches one in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accepted configurations, keyed by provider name.
pub type Configurations = BTreeMap<String, Configuration>;

/// One provider's view of backends and frontends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    pub backends: BTreeMap<String, Backend>,
    pub frontends: BTreeMap<String, Frontend>,
}

/// A named set of routes bound to one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Frontend {
    /// Name of the backend serving this frontend.
    pub backend: String,

    /// Every route must match for the frontend to apply.
    pub routes: BTreeMap<String, Route>,

    /// Forward the client's Host header instead of the server's authority.
    pub pass_host_header: bool,

    /// Higher priorities are tried first; ties are broken by name.
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub rule: String,
}

/// A pool of servers plus its balancing and breaker policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Backend {
    pub servers: BTreeMap<String, Server>,
    pub load_balancer: Option<LoadBalancerConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoadBalancerConfig {
    /// "wrr" or "drr". Anything else falls back to "wrr".
    #[serde(default)]
    pub method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Trip condition, e.g. `NetworkErrorRatio() > 0.5`.
    pub expression: String,

    /// How long the fallback is served once tripped.
    #[serde(default)]
    pub fallback_duration_ms: Option<u64>,

    /// How long traffic is ramped back up before the breaker resets.
    #[serde(default)]
    pub recovery_duration_ms: Option<u64>,

    /// Minimum spacing between expression evaluations.
    #[serde(default)]
    pub check_period_ms: Option<u64>,
}

/// A single upstream target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub weight: u32,
}

/// A snapshot (or its absence) emitted by one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigMessage {
    pub provider_name: String,
    /// `None` means the provider has no data yet.
    pub configuration: Option<Configuration>,
}

impl ConfigMessage {
    pub fn new(provider_name: impl Into<String>, configuration: Configuration) -> Self {
        Self {
            provider_name: provider_name.into(),
            configuration: Some(configuration),
        }
    }

    pub fn empty(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            configuration: None,
        }
    }
}
