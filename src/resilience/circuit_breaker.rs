//! Circuit breaker for backend protection.
//!
//! # States
//! - Standby: normal operation, requests pass through
//! - Tripped: backend assumed down, requests get the fallback
//! - Recovering: a growing share of requests is let through again
//!
//! # State Transitions
//! ```text
//! Standby → Tripped: trip expression true
//! Tripped → Recovering: after fallback duration
//! Recovering → Tripped: trip expression true again
//! Recovering → Standby: after recovery duration
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, shared by every frontend using it
//! - Fail fast while tripped (no upstream call at all)
//! - Metrics reset when recovery starts so stale failures do not re-trip

use rand::Rng;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::expression::{Expression, ExpressionError};
use crate::resilience::window::{Outcome, RollingMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Standby,
    Tripped,
    Recovering,
}

/// Whether a request may go upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Forward,
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub fallback_duration: Duration,
    pub recovery_duration: Duration,
    pub check_period: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            fallback_duration: Duration::from_secs(10),
            recovery_duration: Duration::from_secs(10),
            check_period: Duration::from_millis(100),
        }
    }
}

impl BreakerSettings {
    fn from_config(config: &CircuitBreakerConfig) -> Self {
        let defaults = Self::default();
        Self {
            fallback_duration: config
                .fallback_duration_ms
                .map_or(defaults.fallback_duration, Duration::from_millis),
            recovery_duration: config
                .recovery_duration_ms
                .map_or(defaults.recovery_duration, Duration::from_millis),
            check_period: config
                .check_period_ms
                .map_or(defaults.check_period, Duration::from_millis),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    since: Instant,
    last_check: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    backend: String,
    condition: Expression,
    settings: BreakerSettings,
    metrics: RollingMetrics,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, condition: Expression, settings: BreakerSettings) -> Self {
        Self {
            backend: backend.into(),
            condition,
            settings,
            metrics: RollingMetrics::default(),
            inner: Mutex::new(Inner {
                state: BreakerState::Standby,
                since: Instant::now(),
                last_check: None,
            }),
        }
    }

    pub fn from_config(backend: &str, config: &CircuitBreakerConfig) -> Result<Self, ExpressionError> {
        let condition = config.expression.parse()?;
        Ok(Self::new(backend, condition, BreakerSettings::from_config(config)))
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        tracing::info!(backend = %self.backend, from = ?inner.state, to = ?to, "Circuit breaker state change");
        if to == BreakerState::Tripped {
            metrics::record_breaker_trip(&self.backend);
        }
        if to == BreakerState::Recovering {
            self.metrics.reset();
        }
        inner.state = to;
        inner.since = now;
    }

    /// Decide whether the next request is forwarded or served the fallback.
    pub fn admit(&self) -> Admission {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == BreakerState::Tripped {
            if now.duration_since(inner.since) < self.settings.fallback_duration {
                return Admission::Fallback;
            }
            self.transition(&mut inner, BreakerState::Recovering, now);
        }

        if inner.state == BreakerState::Recovering {
            let elapsed = now.duration_since(inner.since);
            if elapsed >= self.settings.recovery_duration {
                self.transition(&mut inner, BreakerState::Standby, now);
                return Admission::Forward;
            }
            let share = elapsed.as_secs_f64() / self.settings.recovery_duration.as_secs_f64();
            return if rand::thread_rng().gen_bool(share.clamp(0.0, 1.0)) {
                Admission::Forward
            } else {
                Admission::Fallback
            };
        }

        Admission::Forward
    }

    /// Feed the result of a forwarded request and re-check the trip condition.
    pub fn record(&self, outcome: Outcome) {
        self.metrics.record(outcome);

        let now = Instant::now();
        let mut inner = self.lock();
        if inner.state == BreakerState::Tripped {
            return;
        }
        if inner
            .last_check
            .is_some_and(|at| now.duration_since(at) < self.settings.check_period)
        {
            return;
        }
        inner.last_check = Some(now);

        if self.condition.evaluate(&self.metrics.snapshot()) {
            tracing::warn!(backend = %self.backend, "Circuit breaker tripped");
            self.transition(&mut inner, BreakerState::Tripped, now);
        }
    }
}
