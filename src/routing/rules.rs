//! Rule expression compiler.
//!
//! A rule is one or more clauses joined by `&&`. Each clause has the form
//! `Function:arg1,arg2` (or `Function=arg1;arg2`). Clauses are applied one
//! by one to the same [`RouteBuilder`], so their matchers AND together.
//!
//! Functions come from a fixed registry, see [`lookup`].

use axum::http::{HeaderName, Method};
use regex::Regex;
use thiserror::Error;

use crate::routing::matcher::{
    AndMatcher, HeaderMatcher, HeaderRegexMatcher, HostMatcher, Matcher, MethodMatcher,
    PathMatcher, PathPrefixMatcher,
};

/// Separates clauses within one rule string.
pub const CLAUSE_SEPARATOR: &str = "&&";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("error parsing rule `{0}`: expected `Function:args`")]
    Malformed(String),

    #[error("error parsing rule `{rule}`: unknown function `{function}`")]
    UnknownFunction { rule: String, function: String },

    #[error("error parsing args from rule `{0}`")]
    NoArguments(String),

    #[error("rule `{rule}`: {reason}")]
    InvalidMatcher { rule: String, reason: String },
}

/// Accumulates matchers and forwarding annotations for one frontend.
#[derive(Debug, Default)]
pub struct RouteBuilder {
    matchers: Vec<Box<dyn Matcher>>,
    strip_prefixes: Vec<String>,
}

impl RouteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matcher: impl Matcher + 'static) {
        self.matchers.push(Box::new(matcher));
    }

    pub fn add_strip_prefixes(&mut self, prefixes: &[String]) {
        self.strip_prefixes.extend_from_slice(prefixes);
    }

    /// Freeze into the combined matcher and the prefixes to strip.
    pub fn finish(self) -> (AndMatcher, Vec<String>) {
        (AndMatcher::new(self.matchers), self.strip_prefixes)
    }
}

/// Constructor signature shared by every rule function.
pub type RuleFn = fn(&[String], &mut RouteBuilder) -> Result<(), String>;

/// The rule function registry.
pub fn lookup(name: &str) -> Option<RuleFn> {
    let f: RuleFn = match name {
        "Host" => host,
        "Path" => path,
        "PathStrip" => path_strip,
        "PathPrefix" => path_prefix,
        "PathPrefixStrip" => path_prefix_strip,
        "Methods" => methods,
        "Headers" => headers,
        "HeadersRegexp" => headers_regexp,
        _ => return None,
    };
    Some(f)
}

/// Compile a full rule string (one or more clauses) onto `builder`.
pub fn compile_rule(rule: &str, builder: &mut RouteBuilder) -> Result<(), RuleError> {
    for clause in rule.split(CLAUSE_SEPARATOR) {
        compile_clause(clause.trim(), builder)?;
    }
    Ok(())
}

/// Compile a single `Function:args` clause onto `builder`.
pub fn compile_clause(clause: &str, builder: &mut RouteBuilder) -> Result<(), RuleError> {
    let parts: Vec<&str> = clause
        .split(|c: char| c == ':' || c == '=')
        .filter(|s| !s.is_empty())
        .collect();
    let [name, raw_args] = parts.as_slice() else {
        return Err(RuleError::Malformed(clause.to_string()));
    };

    let function = lookup(name).ok_or_else(|| RuleError::UnknownFunction {
        rule: clause.to_string(),
        function: name.to_string(),
    })?;

    let args: Vec<String> = raw_args
        .split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if args.is_empty() {
        return Err(RuleError::NoArguments(clause.to_string()));
    }

    function(&args, builder).map_err(|reason| RuleError::InvalidMatcher {
        rule: clause.to_string(),
        reason,
    })
}

fn host(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    builder.push(HostMatcher::new(args.to_vec()));
    Ok(())
}

fn path(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    builder.push(PathMatcher::new(args.to_vec()));
    Ok(())
}

fn path_strip(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    path(args, builder)?;
    builder.add_strip_prefixes(args);
    Ok(())
}

fn path_prefix(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    builder.push(PathPrefixMatcher::new(args.to_vec()));
    Ok(())
}

fn path_prefix_strip(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    path_prefix(args, builder)?;
    builder.add_strip_prefixes(args);
    Ok(())
}

fn methods(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    let methods = args
        .iter()
        .map(|m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| format!("invalid method `{}`", m))
        })
        .collect::<Result<Vec<_>, _>>()?;
    builder.push(MethodMatcher::new(methods));
    Ok(())
}

fn header_pairs(args: &[String]) -> Result<Vec<(HeaderName, &String)>, String> {
    if args.len() % 2 != 0 {
        return Err("headers must be given as key,value pairs".to_string());
    }
    args.chunks(2)
        .map(|pair| {
            let name = HeaderName::from_bytes(pair[0].as_bytes())
                .map_err(|_| format!("invalid header name `{}`", pair[0]))?;
            Ok((name, &pair[1]))
        })
        .collect()
}

fn headers(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    let pairs = header_pairs(args)?
        .into_iter()
        .map(|(name, value)| (name, value.clone()))
        .collect();
    builder.push(HeaderMatcher::new(pairs));
    Ok(())
}

fn headers_regexp(args: &[String], builder: &mut RouteBuilder) -> Result<(), String> {
    let pairs = header_pairs(args)?
        .into_iter()
        .map(|(name, pattern)| {
            Regex::new(pattern)
                .map(|re| (name, re))
                .map_err(|e| format!("invalid regex `{}`: {}", pattern, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    builder.push(HeaderRegexMatcher::new(pairs));
    Ok(())
}
