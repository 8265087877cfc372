//! Router compilation from merged provider configurations.
//!
//! # Responsibilities
//! - Union backends and frontends across providers (first definition wins)
//! - Compile every route rule of every frontend
//! - Resolve each frontend's backend through a per-build [`BackendPool`]
//!
//! Any error aborts the whole build; nothing partial is returned.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{Backend, Configurations, Frontend};
use crate::load_balancer::server::ServerUrlError;
use crate::load_balancer::BackendPool;
use crate::resilience::expression::ExpressionError;
use crate::routing::router::{CompiledFrontend, RoutingTable};
use crate::routing::rules::{compile_rule, RouteBuilder, RuleError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("frontend `{frontend}`: undefined backend `{backend}`")]
    MissingBackend { frontend: String, backend: String },

    #[error("frontend `{frontend}`, route `{route}`: {source}")]
    Rule {
        frontend: String,
        route: String,
        #[source]
        source: RuleError,
    },

    #[error("backend `{backend}`, server `{server}`: {source}")]
    InvalidServer {
        backend: String,
        server: String,
        #[source]
        source: ServerUrlError,
    },

    #[error("backend `{backend}`: invalid circuit breaker expression: {source}")]
    InvalidBreaker {
        backend: String,
        #[source]
        source: ExpressionError,
    },
}

/// Backends and frontends of all providers, keyed by name.
#[derive(Debug, Default)]
struct Merged<'a> {
    backends: BTreeMap<&'a str, &'a Backend>,
    frontends: BTreeMap<&'a str, &'a Frontend>,
}

fn merge(configurations: &Configurations) -> Merged<'_> {
    let mut merged = Merged::default();
    for (provider, configuration) in configurations {
        for (name, backend) in &configuration.backends {
            if merged.backends.contains_key(name.as_str()) {
                tracing::warn!(provider = %provider, backend = %name, "Backend already defined by another provider, skipping");
                continue;
            }
            merged.backends.insert(name, backend);
        }
        for (name, frontend) in &configuration.frontends {
            if merged.frontends.contains_key(name.as_str()) {
                tracing::warn!(provider = %provider, frontend = %name, "Frontend already defined by another provider, skipping");
                continue;
            }
            merged.frontends.insert(name, frontend);
        }
    }
    merged
}

/// Compile the union of `configurations` into a routing table.
pub fn build_router(configurations: &Configurations) -> Result<RoutingTable, BuildError> {
    let merged = merge(configurations);
    let mut pool = BackendPool::new();
    let mut compiled = Vec::with_capacity(merged.frontends.len());

    for (&name, frontend) in &merged.frontends {
        let backend_config =
            merged
                .backends
                .get(frontend.backend.as_str())
                .ok_or_else(|| BuildError::MissingBackend {
                    frontend: name.to_string(),
                    backend: frontend.backend.clone(),
                })?;

        let mut builder = RouteBuilder::new();
        for (route_name, route) in &frontend.routes {
            compile_rule(&route.rule, &mut builder).map_err(|source| BuildError::Rule {
                frontend: name.to_string(),
                route: route_name.clone(),
                source,
            })?;
        }
        let (matcher, strip_prefixes) = builder.finish();

        let backend = pool.get_or_create(&frontend.backend, backend_config)?;

        tracing::debug!(frontend = %name, backend = %frontend.backend, matchers = matcher.len(), "Compiled frontend");
        compiled.push(CompiledFrontend {
            name: name.to_string(),
            priority: frontend.priority,
            pass_host_header: frontend.pass_host_header,
            matcher,
            strip_prefixes,
            backend,
        });
    }

    Ok(RoutingTable::new(compiled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Route, Server};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;

    fn backend(url: &str) -> Backend {
        let mut backend = Backend::default();
        backend.servers.insert(
            "s1".into(),
            Server {
                url: url.into(),
                weight: 1,
            },
        );
        backend
    }

    fn frontend(backend: &str, rule: &str) -> Frontend {
        let mut frontend = Frontend {
            backend: backend.into(),
            ..Default::default()
        };
        frontend.routes.insert("r1".into(), Route { rule: rule.into() });
        frontend
    }

    fn request(host: &str, path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("host", host)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn builds_and_matches() {
        let mut config = Configuration::default();
        config.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        config.frontends.insert("f1".into(), frontend("b1", "Host:test.local"));
        let configs = Configurations::from([("p1".to_string(), config)]);

        let table = build_router(&configs).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.match_request(&request("test.local", "/")).map(|f| f.name.as_str()),
            Some("f1")
        );
        assert!(table.match_request(&request("other.local", "/")).is_none());
    }

    #[test]
    fn missing_backend_fails() {
        let mut config = Configuration::default();
        config.frontends.insert("f1".into(), frontend("nope", "Host:test.local"));
        let configs = Configurations::from([("p1".to_string(), config)]);

        assert_eq!(
            build_router(&configs).unwrap_err(),
            BuildError::MissingBackend {
                frontend: "f1".into(),
                backend: "nope".into()
            }
        );
    }

    #[test]
    fn bad_rule_fails() {
        let mut config = Configuration::default();
        config.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        config.frontends.insert("f1".into(), frontend("b1", "Bogus:x"));
        let configs = Configurations::from([("p1".to_string(), config)]);

        assert!(matches!(
            build_router(&configs),
            Err(BuildError::Rule { .. })
        ));
    }

    #[test]
    fn frontends_share_backend_handler() {
        let mut config = Configuration::default();
        config.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        config.frontends.insert("f1".into(), frontend("b1", "Host:a.local"));
        config.frontends.insert("f2".into(), frontend("b1", "Host:b.local"));
        let configs = Configurations::from([("p1".to_string(), config)]);

        let table = build_router(&configs).unwrap();
        let f1 = table.frontend("f1").unwrap();
        let f2 = table.frontend("f2").unwrap();
        assert!(Arc::ptr_eq(&f1.backend, &f2.backend));

        f1.backend.servers()[0].set_weight(7);
        assert_eq!(f2.backend.servers()[0].weight(), 7);
    }

    #[test]
    fn backends_resolve_across_providers() {
        let mut backends = Configuration::default();
        backends.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        let mut frontends = Configuration::default();
        frontends.frontends.insert("f1".into(), frontend("b1", "Path:/a"));
        let configs = Configurations::from([
            ("p1".to_string(), backends),
            ("p2".to_string(), frontends),
        ]);

        let table = build_router(&configs).unwrap();
        assert!(table.match_request(&request("x", "/a")).is_some());
        assert!(table.match_request(&request("x", "/a/b")).is_none());
    }

    #[test]
    fn first_provider_wins_duplicates() {
        let mut first = Configuration::default();
        first.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        first.frontends.insert("f1".into(), frontend("b1", "Host:first.local"));
        let mut second = Configuration::default();
        second.backends.insert("b1".into(), backend("http://127.0.0.1:9002"));
        second.frontends.insert("f1".into(), frontend("b1", "Host:second.local"));
        let configs = Configurations::from([("a".to_string(), first), ("b".to_string(), second)]);

        let table = build_router(&configs).unwrap();
        assert!(table.match_request(&request("first.local", "/")).is_some());
        assert!(table.match_request(&request("second.local", "/")).is_none());
        assert_eq!(
            table.frontend("f1").unwrap().backend.servers()[0].authority().as_str(),
            "127.0.0.1:9001"
        );
    }

    #[test]
    fn priority_orders_overlapping_frontends() {
        let mut config = Configuration::default();
        config.backends.insert("b1".into(), backend("http://127.0.0.1:9001"));
        config.frontends.insert("a-low".into(), frontend("b1", "PathPrefix:/"));
        let mut high = frontend("b1", "PathPrefix:/api");
        high.priority = 10;
        config.frontends.insert("z-high".into(), high);
        let configs = Configurations::from([("p1".to_string(), config)]);

        let table = build_router(&configs).unwrap();
        let name = |path| table.match_request(&request("x", path)).map(|f| f.name.clone());
        assert_eq!(name("/api/users").as_deref(), Some("z-high"));
        assert_eq!(name("/other").as_deref(), Some("a-low"));
    }
}
