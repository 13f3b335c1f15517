//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: testing if endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip predicate holds (default: 3 consecutive failures)
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: trial requests succeed
//! Half-Open → Open: any trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker (not global)
//! - Fail fast in Open state (the operation is never invoked)
//! - Callers classify each result as `Outcome::{Success, Failure, Ignored}`;
//!   ignored outcomes leave the counters alone
//! - Every transition starts a new generation; late outcomes from an older
//!   generation are discarded
//! - Permits release themselves on drop, so a cancelled trial cannot wedge
//!   the breaker in Half-Open

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Default number of consecutive failures that opens a breaker.
pub const DEFAULT_CONSECUTIVE_FAILURES: u32 = 3;

/// Default time a breaker stays open before admitting a trial request.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Request counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    fn on_ignored(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    /// Share of settled requests that failed, in `[0, 1]`.
    pub fn failure_ratio(&self) -> f64 {
        let settled = self.total_successes + self.total_failures;
        if settled == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(settled)
        }
    }
}

/// Decides from the current counts whether a closed breaker should open.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Trip once `threshold` consecutive failures have been recorded.
pub fn consecutive_failures(threshold: u32) -> TripPredicate {
    Arc::new(move |counts: &Counts| counts.consecutive_failures >= threshold)
}

/// The predicate used when none is configured.
pub fn default_trip_predicate() -> TripPredicate {
    consecutive_failures(DEFAULT_CONSECUTIVE_FAILURES)
}

/// Breaker tuning. Cloned per endpoint with a distinct name.
#[derive(Clone)]
pub struct BreakerSettings {
    /// Name used in logs and metrics.
    pub name: String,
    /// How long the breaker stays open.
    pub cooldown: Duration,
    /// Rolling window for closed-state counts. `None` clears only on transitions.
    pub interval: Option<Duration>,
    /// Trial requests admitted while half-open; that many successes close it.
    pub max_half_open_requests: u32,
    /// Trip predicate. `None` falls back to `default_trip_predicate()`.
    pub ready_to_trip: Option<TripPredicate>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "llm-lb".to_string(),
            cooldown: DEFAULT_COOLDOWN,
            interval: None,
            max_half_open_requests: 1,
            ready_to_trip: Some(default_trip_predicate()),
        }
    }
}

impl BreakerSettings {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_trip_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for BreakerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("name", &self.name)
            .field("cooldown", &self.cooldown)
            .field("interval", &self.interval)
            .field("max_half_open_requests", &self.max_half_open_requests)
            .field("ready_to_trip", &self.ready_to_trip.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// How a finished request should be accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Neither success nor failure, e.g. a malformed request.
    Ignored,
}

/// Why the breaker refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("circuit breaker is open")]
    Open,
    #[error("too many requests while circuit breaker is half-open")]
    TooManyRequests,
}

/// Error returned by `CircuitBreaker::call`.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Rejected(Rejection),
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

/// Per-endpoint circuit breaker.
pub struct CircuitBreaker {
    name: String,
    cooldown: Duration,
    interval: Option<Duration>,
    max_half_open_requests: u32,
    ready_to_trip: TripPredicate,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let ready_to_trip = settings.ready_to_trip.unwrap_or_else(|| {
            tracing::debug!(breaker = %settings.name, "No trip predicate configured, using default");
            default_trip_predicate()
        });
        let interval = settings.interval.filter(|i| !i.is_zero());

        Self {
            name: settings.name,
            cooldown: settings.cooldown,
            interval,
            max_half_open_requests: settings.max_half_open_requests.max(1),
            ready_to_trip,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: interval.map(|i| Instant::now() + i),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, without side effects.
    ///
    /// An open breaker whose cooldown has elapsed reports `HalfOpen`, since
    /// the next request would be admitted as a trial.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.expiry) {
            (CircuitState::Open, Some(expiry)) if expiry <= Instant::now() => CircuitState::HalfOpen,
            (state, _) => state,
        }
    }

    /// Counters of the current generation.
    pub fn counts(&self) -> Counts {
        let inner = self.lock();
        match (inner.state, inner.expiry) {
            (CircuitState::Closed, Some(expiry)) if expiry <= Instant::now() => Counts::default(),
            (CircuitState::Open, Some(expiry)) if expiry <= Instant::now() => Counts::default(),
            _ => inner.counts,
        }
    }

    /// Ask to send one request.
    ///
    /// The returned permit must be settled with `Permit::record`; dropping it
    /// unsettled counts as `Outcome::Ignored`.
    pub fn try_acquire(self: &Arc<Self>) -> Result<Permit, Rejection> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Open => return Err(Rejection::Open),
            CircuitState::HalfOpen if inner.counts.requests >= self.max_half_open_requests => {
                return Err(Rejection::TooManyRequests);
            }
            _ => {}
        }

        inner.counts.on_request();
        Ok(Permit {
            breaker: Arc::clone(self),
            generation: inner.generation,
            settled: false,
        })
    }

    /// Run `operation` through the breaker.
    ///
    /// `classify` maps the operation's result to the outcome fed back into
    /// the breaker. The result itself is returned untouched.
    pub async fn call<T, E, F, Fut, C>(self: &Arc<Self>, operation: F, classify: C) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&Result<T, E>) -> Outcome,
    {
        let permit = self.try_acquire().map_err(BreakerError::Rejected)?;
        let result = operation().await;
        permit.record(classify(&result));
        result.map_err(BreakerError::Inner)
    }

    fn after_request(&self, generation: u64, outcome: Outcome) {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        if generation != inner.generation {
            return;
        }

        match outcome {
            Outcome::Success => {
                inner.counts.on_success();
                if inner.state == CircuitState::HalfOpen
                    && inner.counts.consecutive_successes >= self.max_half_open_requests
                {
                    self.transition(&mut inner, CircuitState::Closed, now);
                }
            }
            Outcome::Failure => {
                inner.counts.on_failure();
                match inner.state {
                    CircuitState::Closed if (self.ready_to_trip)(&inner.counts) => {
                        self.transition(&mut inner, CircuitState::Open, now);
                    }
                    CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open, now),
                    _ => {}
                }
            }
            Outcome::Ignored => inner.counts.on_ignored(),
        }
    }

    /// Apply time-driven changes: cooldown expiry and closed-state window rollover.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        let expired = matches!(inner.expiry, Some(expiry) if expiry <= now);
        match inner.state {
            CircuitState::Closed if expired => self.new_generation(inner, now),
            CircuitState::Open if expired => self.transition(inner, CircuitState::HalfOpen, now),
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        self.new_generation(inner, now);

        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state change");
        metrics::record_breaker_state(&self.name, to);
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => self.interval.map(|i| now + i),
            CircuitState::Open => Some(now + self.cooldown),
            CircuitState::HalfOpen => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("counts", &self.counts())
            .finish()
    }
}

/// Admission to send one request through a breaker.
#[must_use = "an unsettled permit is recorded as ignored"]
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    settled: bool,
}

impl Permit {
    /// Report how the request ended.
    pub fn record(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.after_request(self.generation, outcome);
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.breaker.name)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, Outcome::Ignored);
        }
    }
}
