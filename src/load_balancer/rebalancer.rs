//! Dynamic round-robin: weighted round robin with feedback.
//!
//! Every `interval` the rebalancer reads each server's latency and failure
//! counters. Servers that are clearly worse than the best one are "bad".
//! While some servers are bad, the good ones get their multiplier doubled
//! (up to [`MAX_MULTIPLIER`]) and bad ones are reset to 1, shifting traffic
//! away without ever removing a server. Once nothing is bad, multipliers
//! halve back toward 1.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::load_balancer::server::{IntervalStats, Server};
use crate::load_balancer::{wrr::WeightedRoundRobin, LoadBalancer};

pub const MAX_MULTIPLIER: u32 = 64;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Failure ratio above the best server's that marks a server bad.
const FAILURE_RATIO_MARGIN: f64 = 0.1;
/// Mean latency multiple of the best server's that marks a server bad.
const LATENCY_FACTOR: f64 = 3.0;
/// Absolute latency gap below which latency differences are ignored.
const MIN_LATENCY_GAP: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct Rebalancer {
    inner: WeightedRoundRobin,
    interval: Duration,
    last_adjusted: Mutex<Instant>,
}

impl Default for Rebalancer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Rebalancer {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: WeightedRoundRobin::new(),
            interval,
            last_adjusted: Mutex::new(Instant::now()),
        }
    }

    fn maybe_adjust(&self, servers: &[Arc<Server>]) {
        let now = Instant::now();
        {
            let mut last = self.last_adjusted.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < self.interval {
                return;
            }
            *last = now;
        }
        adjust(servers);
    }
}

/// Apply one rebalancing round to `servers` using their interval counters.
pub fn adjust(servers: &[Arc<Server>]) {
    let stats: Vec<IntervalStats> = servers.iter().map(|s| s.take_stats()).collect();
    let measured: Vec<&IntervalStats> = stats.iter().filter(|s| s.requests > 0).collect();
    if measured.len() < 2 {
        return;
    }

    let best_failure = measured
        .iter()
        .map(|s| s.failure_ratio())
        .fold(f64::INFINITY, f64::min);
    let best_latency = measured
        .iter()
        .map(|s| s.mean_latency())
        .min()
        .unwrap_or_default();

    let is_bad = |s: &IntervalStats| -> bool {
        if s.requests == 0 {
            return false;
        }
        let failing = s.failure_ratio() - best_failure > FAILURE_RATIO_MARGIN;
        let latency = s.mean_latency();
        let slow = latency.as_secs_f64() > best_latency.as_secs_f64() * LATENCY_FACTOR
            && latency.saturating_sub(best_latency) > MIN_LATENCY_GAP;
        failing || slow
    };

    let bad: Vec<bool> = stats.iter().map(is_bad).collect();
    let any_bad = bad.iter().any(|b| *b);
    let all_bad = bad.iter().all(|b| *b);

    for (server, bad) in servers.iter().zip(bad) {
        let current = server.multiplier();
        let next = if any_bad && !all_bad {
            if bad {
                1
            } else {
                (current * 2).min(MAX_MULTIPLIER)
            }
        } else {
            (current / 2).max(1)
        };
        if next != current {
            tracing::debug!(server = %server.name(), bad, multiplier = next, "Rebalanced server weight");
            server.set_multiplier(next);
        }
    }
}

impl LoadBalancer for Rebalancer {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
        self.maybe_adjust(servers);
        self.inner.next_server(servers)
    }
}
