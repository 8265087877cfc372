//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact, case-sensitive)
//! - Match exact paths and path prefixes
//! - Match method whitelists and header values (exact or regex)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - A matcher built from several values matches if any value matches
//! - Header pairs within one matcher must all match
//! - Port in the Host header is ignored unless the rule names one

use axum::body::Body;
use axum::http::{header, HeaderName, Method, Request};
use regex::Regex;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Host of the request, from the Host header or the absolute URI.
pub(crate) fn request_host(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.rfind(']') {
        return &host[..=end];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    hosts: Vec<String>,
}

impl HostMatcher {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let Some(actual) = request_host(req) else {
            return false;
        };
        self.hosts.iter().any(|expected| {
            if strip_port(expected) == expected.as_str() {
                strip_port(actual) == expected
            } else {
                actual == expected
            }
        })
    }
}

/// Matches the exact request path.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    paths: Vec<String>,
}

impl PathMatcher {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let path = req.uri().path();
        self.paths.iter().any(|p| p == path)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefixes: Vec<String>,
}

impl PathPrefixMatcher {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let path = req.uri().path();
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Matches a whitelist of HTTP methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.contains(req.method())
    }
}

/// Matches header values exactly. Every pair must be present.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    pairs: Vec<(HeaderName, String)>,
}

impl HeaderMatcher {
    pub fn new(pairs: Vec<(HeaderName, String)>) -> Self {
        Self { pairs }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.pairs.iter().all(|(name, expected)| {
            req.headers()
                .get_all(name)
                .iter()
                .any(|v| v.to_str().map(|v| v == expected).unwrap_or(false))
        })
    }
}

/// Matches header values against regular expressions. Every pair must match.
#[derive(Debug, Clone)]
pub struct HeaderRegexMatcher {
    pairs: Vec<(HeaderName, Regex)>,
}

impl HeaderRegexMatcher {
    pub fn new(pairs: Vec<(HeaderName, Regex)>) -> Self {
        Self { pairs }
    }
}

impl Matcher for HeaderRegexMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.pairs.iter().all(|(name, pattern)| {
            req.headers()
                .get_all(name)
                .iter()
                .any(|v| v.to_str().map(|v| pattern.is_match(v)).unwrap_or(false))
        })
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req_with_host(host: &str) -> Request<Body> {
        Request::builder()
            .header("Host", host)
            .body(Body::default())
            .unwrap()
    }

    fn req_with_path(path: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("http://example.com{}", path))
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new(vec!["foo.bar".into()]);

        assert!(matcher.matches(&req_with_host("foo.bar")));
        assert!(matcher.matches(&req_with_host("foo.bar:8080")));
        assert!(!matcher.matches(&req_with_host("bar.foo")));
        // Case sensitive
        assert!(!matcher.matches(&req_with_host("FOO.BAR")));
    }

    #[test]
    fn test_host_matcher_with_port() {
        let matcher = HostMatcher::new(vec!["foo.bar:8080".into()]);
        assert!(matcher.matches(&req_with_host("foo.bar:8080")));
        assert!(!matcher.matches(&req_with_host("foo.bar")));
    }

    #[test]
    fn test_host_matcher_ipv6() {
        let matcher = HostMatcher::new(vec!["[::1]".into()]);
        assert!(matcher.matches(&req_with_host("[::1]:80")));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathMatcher::new(vec!["/a".into()]);
        assert!(matcher.matches(&req_with_path("/a")));
        assert!(!matcher.matches(&req_with_path("/ab")));
        assert!(!matcher.matches(&req_with_path("/a/b")));
    }

    #[test]
    fn test_path_prefix_matcher() {
        let matcher = PathPrefixMatcher::new(vec!["/api".into(), "/v2".into()]);
        assert!(matcher.matches(&req_with_path("/api/v1")));
        assert!(matcher.matches(&req_with_path("/v2/users")));
        assert!(!matcher.matches(&req_with_path("/images")));
    }

    #[test]
    fn test_method_matcher() {
        let matcher = MethodMatcher::new(vec![Method::GET, Method::HEAD]);
        let get = Request::get("/").body(Body::default()).unwrap();
        let post = Request::post("/").body(Body::default()).unwrap();
        assert!(matcher.matches(&get));
        assert!(!matcher.matches(&post));
    }

    #[test]
    fn test_header_matchers() {
        let req = Request::builder()
            .header("X-Env", "staging")
            .header("X-Team", "core")
            .body(Body::default())
            .unwrap();

        let exact = HeaderMatcher::new(vec![
            (HeaderName::from_static("x-env"), "staging".into()),
            (HeaderName::from_static("x-team"), "core".into()),
        ]);
        assert!(exact.matches(&req));

        let wrong = HeaderMatcher::new(vec![(HeaderName::from_static("x-env"), "prod".into())]);
        assert!(!wrong.matches(&req));

        let regex = HeaderRegexMatcher::new(vec![(
            HeaderName::from_static("x-env"),
            Regex::new("^stag").unwrap(),
        )]);
        assert!(regex.matches(&req));
    }

    #[test]
    fn test_and_matcher() {
        let matcher = AndMatcher::new(vec![
            Box::new(HostMatcher::new(vec!["example.com".into()])),
            Box::new(PathPrefixMatcher::new(vec!["/api".into()])),
        ]);
        let hit = Request::builder()
            .uri("/api/x")
            .header("Host", "example.com")
            .body(Body::default())
            .unwrap();
        let miss = Request::builder()
            .uri("/web")
            .header("Host", "example.com")
            .body(Body::default())
            .unwrap();
        assert!(matcher.matches(&hit));
        assert!(!matcher.matches(&miss));
    }
}
