//! Rolling-window request metrics.
//!
//! Samples are kept in fixed-width time buckets. Buckets older than the
//! window are discarded as new samples arrive, so a snapshot only ever
//! reflects the recent past.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Latency samples kept per bucket. Further samples still count toward
/// totals but are not used for quantiles.
const MAX_LATENCY_SAMPLES: usize = 4096;

/// The observable result of one forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub latency: Duration,
    /// Response status, or `None` when the upstream could not be reached.
    pub status: Option<u16>,
}

impl Outcome {
    pub fn response(status: u16, latency: Duration) -> Self {
        Self {
            latency,
            status: Some(status),
        }
    }

    pub fn network_error(latency: Duration) -> Self {
        Self {
            latency,
            status: None,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    start: Instant,
    total: u64,
    network_errors: u64,
    codes: HashMap<u16, u64>,
    latencies_ms: Vec<f64>,
}

impl Bucket {
    fn new(start: Instant) -> Self {
        Self {
            start,
            total: 0,
            network_errors: 0,
            codes: HashMap::new(),
            latencies_ms: Vec::new(),
        }
    }
}

/// Rolling metrics over `bucket_count` buckets of `bucket_span` each.
#[derive(Debug)]
pub struct RollingMetrics {
    bucket_span: Duration,
    bucket_count: usize,
    buckets: Mutex<VecDeque<Bucket>>,
}

impl Default for RollingMetrics {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 10)
    }
}

impl RollingMetrics {
    pub fn new(bucket_span: Duration, bucket_count: usize) -> Self {
        Self {
            bucket_span,
            bucket_count: bucket_count.max(1),
            buckets: Mutex::new(VecDeque::new()),
        }
    }

    fn window(&self) -> Duration {
        self.bucket_span * self.bucket_count as u32
    }

    fn expire(&self, buckets: &mut VecDeque<Bucket>, now: Instant) {
        let window = self.window();
        while buckets
            .front()
            .is_some_and(|b| now.duration_since(b.start) >= window)
        {
            buckets.pop_front();
        }
    }

    pub fn record(&self, outcome: Outcome) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut buckets, now);

        let needs_bucket = buckets
            .back()
            .map_or(true, |b| now.duration_since(b.start) >= self.bucket_span);
        if needs_bucket {
            buckets.push_back(Bucket::new(now));
        }
        let Some(bucket) = buckets.back_mut() else {
            return;
        };

        bucket.total += 1;
        match outcome.status {
            Some(code) => *bucket.codes.entry(code).or_default() += 1,
            None => bucket.network_errors += 1,
        }
        if bucket.latencies_ms.len() < MAX_LATENCY_SAMPLES {
            bucket
                .latencies_ms
                .push(outcome.latency.as_secs_f64() * 1000.0);
        }
    }

    /// Aggregate every live bucket.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut buckets, now);

        let mut snapshot = MetricsSnapshot::default();
        for bucket in buckets.iter() {
            snapshot.total += bucket.total;
            snapshot.network_errors += bucket.network_errors;
            for (code, count) in &bucket.codes {
                *snapshot.codes.entry(*code).or_default() += count;
            }
            snapshot.latencies_ms.extend_from_slice(&bucket.latencies_ms);
        }
        snapshot.latencies_ms.sort_by(f64::total_cmp);
        snapshot
    }

    pub fn reset(&self) {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Point-in-time aggregate of a [`RollingMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub network_errors: u64,
    pub codes: HashMap<u16, u64>,
    /// Sorted ascending.
    pub latencies_ms: Vec<f64>,
}

impl MetricsSnapshot {
    /// Share of requests that never got a response.
    pub fn network_error_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.network_errors as f64 / self.total as f64
    }

    /// Count of responses with `from <= code < to` divided by the count with
    /// `dividend_from <= code < dividend_to`.
    pub fn response_code_ratio(&self, from: u16, to: u16, dividend_from: u16, dividend_to: u16) -> f64 {
        let count = |lo: u16, hi: u16| -> u64 {
            self.codes
                .iter()
                .filter(|(code, _)| **code >= lo && **code < hi)
                .map(|(_, n)| *n)
                .sum()
        };
        let dividend = count(dividend_from, dividend_to);
        if dividend == 0 {
            return 0.0;
        }
        count(from, to) as f64 / dividend as f64
    }

    /// Latency at quantile `q` (0-100), in milliseconds.
    pub fn latency_at_quantile_ms(&self, q: f64) -> f64 {
        if self.latencies_ms.is_empty() {
            return 0.0;
        }
        let q = q.clamp(0.0, 100.0) / 100.0;
        let rank = (q * (self.latencies_ms.len() - 1) as f64).round() as usize;
        self.latencies_ms[rank]
    }
}
