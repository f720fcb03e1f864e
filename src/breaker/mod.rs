//! Circuit breaker guarding calls to the transcription engine.
//!
//! One [`CircuitBreaker`] is owned per external dependency and shared (via `Arc`) by every
//! caller. The state is mirrored in an atomic so health checks and the dispatch hot path read
//! it without taking the lock; outcomes and transitions go through a `parking_lot` mutex.
//!
//! Calls obtain a [`CallPermit`] first. A permit that is dropped without recording an outcome
//! (for example because the caller's timeout cancelled the call) counts as a failure.

mod window;
mod wrapper;

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::engine::EngineError;
use window::{CallOutcome, SlidingWindow};

pub use wrapper::BreakerEngine;

/// Thresholds and timings of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Number of most recent calls the rates are computed over.
    pub sliding_window_size: usize,
    /// Calls that must be buffered before the rates are evaluated.
    pub min_calls: usize,
    /// Failure percentage at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Calls slower than this count as slow.
    #[serde(alias = "slow_call_duration_threshold")]
    pub slow_call_duration_threshold_ms: u64,
    /// Slow-call percentage at or above which the circuit opens.
    pub slow_call_rate_threshold: f64,
    /// How long the circuit stays open before admitting trial calls.
    #[serde(alias = "wait_duration_open")]
    pub wait_duration_open_ms: u64,
    /// Trial calls admitted while half-open.
    pub half_open_trial_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            min_calls: 5,
            failure_rate_threshold: 50.0,
            slow_call_duration_threshold_ms: 10_000,
            slow_call_rate_threshold: 50.0,
            wait_duration_open_ms: 30_000,
            half_open_trial_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn slow_call_duration_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_duration_threshold_ms)
    }

    pub fn wait_duration_open(&self) -> Duration {
        Duration::from_millis(self.wait_duration_open_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_rate: Option<f64>,
    pub slow_call_rate: Option<f64>,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub slow_calls: usize,
    pub not_permitted_calls: u64,
    pub buffered_calls: usize,
    pub window_size: usize,
    pub last_transition_at: DateTime<Utc>,
}

struct Inner {
    window: SlidingWindow,
    trial: SlidingWindow,
    trial_permits: usize,
    // Bumped on every transition; permits from an older generation are ignored.
    generation: u64,
    not_permitted: u64,
    last_transition_at: DateTime<Utc>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    epoch: Instant,
    open_until_ms: AtomicU64,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let trial_calls = config.half_open_trial_calls.max(1);
        Self {
            name: name.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            epoch: Instant::now(),
            open_until_ms: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                window: SlidingWindow::new(config.sliding_window_size),
                trial: SlidingWindow::new(trial_calls),
                trial_permits: 0,
                generation: 0,
                not_permitted: 0,
                last_transition_at: Utc::now(),
            }),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without taking the lock.
    ///
    /// An open circuit whose wait has elapsed is reported as `HalfOpen`: the next call
    /// will be admitted as a trial.
    pub fn state(&self) -> CircuitState {
        let raw = self.raw_state();
        if raw == CircuitState::Open && self.remaining_open_duration().is_zero() {
            CircuitState::HalfOpen
        } else {
            raw
        }
    }

    pub fn is_available(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Time left before an open circuit admits trial calls; zero when not open.
    pub fn remaining_open_duration(&self) -> Duration {
        if self.raw_state() != CircuitState::Open {
            return Duration::ZERO;
        }
        let until = self.open_until_ms.load(Ordering::Acquire);
        Duration::from_millis(until.saturating_sub(self.now_ms()))
    }

    /// Ask for permission to make one call.
    ///
    /// Fails fast with [`EngineError::CircuitOpen`] while open, or while half-open with
    /// every trial slot taken.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, EngineError> {
        let mut inner = self.inner.lock();
        let mut state = self.raw_state();

        if state == CircuitState::Open && self.remaining_open_duration().is_zero() {
            self.transition(&mut inner, CircuitState::HalfOpen, "wait duration elapsed");
            state = CircuitState::HalfOpen;
        }

        let permitted = match state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen if inner.trial_permits < inner.trial.capacity() => {
                inner.trial_permits += 1;
                true
            }
            _ => false,
        };

        if !permitted {
            inner.not_permitted += 1;
            tracing::debug!(breaker = %self.name, %state, "Call not permitted");
            return Err(EngineError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        Ok(CallPermit {
            breaker: self,
            generation: inner.generation,
            started: Instant::now(),
            recorded: false,
        })
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.lock();
        let state = self.state();
        let window = if self.raw_state() == CircuitState::HalfOpen {
            &inner.trial
        } else {
            &inner.window
        };

        BreakerMetrics {
            name: self.name.clone(),
            state,
            failure_rate: window.failure_rate(),
            slow_call_rate: window.slow_call_rate(),
            successful_calls: window.successful(),
            failed_calls: window.failed(),
            slow_calls: window.slow(),
            not_permitted_calls: inner.not_permitted,
            buffered_calls: window.len(),
            window_size: window.capacity(),
            last_transition_at: inner.last_transition_at,
        }
    }

    /// Administrative reset to `Closed`, discarding recorded outcomes.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed, "manual reset");
    }

    /// Administrative move to `HalfOpen`, admitting trial calls immediately.
    pub fn transition_to_half_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::HalfOpen, "manual half-open");
    }

    /// Administrative move to `Open` for the configured wait duration.
    pub fn trip(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open, "manual trip");
    }

    fn raw_state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn on_outcome(&self, generation: u64, elapsed: Duration, failed: bool) {
        let outcome = CallOutcome {
            failed,
            slow: elapsed > self.config.slow_call_duration_threshold(),
        };
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            tracing::debug!(breaker = %self.name, "Ignoring outcome from before the last transition");
            return;
        }

        match self.raw_state() {
            CircuitState::Closed => {
                inner.window.record(outcome);
                if let Some(reason) = self.threshold_exceeded(&inner.window, self.config.min_calls) {
                    self.transition(&mut inner, CircuitState::Open, &reason);
                }
            }
            CircuitState::HalfOpen => {
                if outcome.failed {
                    self.transition(&mut inner, CircuitState::Open, "trial call failed");
                    return;
                }
                inner.trial.record(outcome);
                if inner.trial.len() >= inner.trial.capacity() {
                    match self.threshold_exceeded(&inner.trial, 1) {
                        Some(reason) => self.transition(&mut inner, CircuitState::Open, &reason),
                        None => self.transition(&mut inner, CircuitState::Closed, "trial calls succeeded"),
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn threshold_exceeded(&self, window: &SlidingWindow, min_calls: usize) -> Option<String> {
        if window.len() < min_calls.max(1) {
            return None;
        }
        if let Some(rate) = window.failure_rate()
            && rate >= self.config.failure_rate_threshold
        {
            return Some(format!(
                "failure rate {rate:.1}% >= {:.1}%",
                self.config.failure_rate_threshold
            ));
        }
        if let Some(rate) = window.slow_call_rate()
            && rate >= self.config.slow_call_rate_threshold
        {
            return Some(format!(
                "slow call rate {rate:.1}% >= {:.1}%",
                self.config.slow_call_rate_threshold
            ));
        }
        None
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, reason: &str) {
        let from = self.raw_state();
        inner.generation += 1;
        inner.window.clear();
        inner.trial.clear();
        inner.trial_permits = 0;
        inner.last_transition_at = Utc::now();

        if to == CircuitState::Open {
            let wait_ms = self.config.wait_duration_open_ms;
            self.open_until_ms
                .store(self.now_ms().saturating_add(wait_ms), Ordering::Release);
        }
        self.state.store(to as u8, Ordering::Release);

        if to == CircuitState::Open {
            tracing::warn!(breaker = %self.name, %from, %to, reason, "Circuit breaker opened");
        } else {
            tracing::info!(breaker = %self.name, %from, %to, reason, "Circuit breaker state changed");
        }
    }
}

/// Permission for one call through the breaker.
#[must_use = "a permit dropped without recording counts as a failed call"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    started: Instant,
    recorded: bool,
}

impl CallPermit<'_> {
    pub fn record_success(self) {
        self.record(false);
    }

    pub fn record_failure(self) {
        self.record(true);
    }

    /// Record the outcome of an engine call. Only dependency failures count against the breaker.
    pub fn record_result<T>(self, result: &Result<T, EngineError>) {
        let failed = matches!(result, Err(err) if err.is_dependency_failure());
        self.record(failed);
    }

    fn record(mut self, failed: bool) {
        self.recorded = true;
        self.breaker
            .on_outcome(self.generation, self.started.elapsed(), failed);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker
                .on_outcome(self.generation, self.started.elapsed(), true);
        }
    }
}
