//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled frontends in match order
//! - Look up the frontend for a request
//! - Return the matched frontend or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over frontends, highest priority first
//! - Explicit `None` rather than a silent default

use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;

use crate::load_balancer::BackendHandler;
use crate::routing::matcher::{AndMatcher, Matcher};

/// A frontend ready to serve traffic.
#[derive(Debug)]
pub struct CompiledFrontend {
    pub name: String,
    pub priority: i32,
    pub pass_host_header: bool,
    pub matcher: AndMatcher,
    /// Path prefixes removed before forwarding, tried in order.
    pub strip_prefixes: Vec<String>,
    pub backend: Arc<BackendHandler>,
}

/// The compiled routing table of one build.
#[derive(Debug, Default)]
pub struct RoutingTable {
    frontends: Vec<CompiledFrontend>,
}

impl RoutingTable {
    /// Orders frontends by priority (highest first), then by name.
    pub fn new(mut frontends: Vec<CompiledFrontend>) -> Self {
        frontends.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Self { frontends }
    }

    /// First frontend whose routes all match.
    pub fn match_request(&self, req: &Request<Body>) -> Option<&CompiledFrontend> {
        self.frontends.iter().find(|f| f.matcher.matches(req))
    }

    pub fn frontend(&self, name: &str) -> Option<&CompiledFrontend> {
        self.frontends.iter().find(|f| f.name == name)
    }

    pub fn frontends(&self) -> &[CompiledFrontend] {
        &self.frontends
    }

    pub fn len(&self) -> usize {
        self.frontends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontends.is_empty()
    }
}
