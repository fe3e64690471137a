//! # Circuit Breaker Module
//!
//! Stops calling an external service after repeated failures so that a slow
//! or dead dependency fails requests fast instead of tying up handlers.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Start of the half-open trial call, if one is in flight
    trial_started: Option<Instant>,
}

/// Circuit breaker guarding calls to an external service
///
/// # State Machine
///
/// - **Closed**: calls pass through
/// - **Open**: `failure_threshold` consecutive failures, calls fail fast
/// - **Half-Open**: `reset_secs` after the last failure a single trial call
///   is admitted by [`try_acquire`](Self::try_acquire); success closes the
///   breaker, failure opens it again. A trial that reports no result within
///   `reset_secs` (a cancelled caller) frees the slot for the next one.
///
/// # Examples
///
/// ```rust
/// use cookit::circuit_breaker::CircuitBreaker;
/// use cookit::config::BreakerConfig;
///
/// let breaker = CircuitBreaker::new(BreakerConfig { failure_threshold: 2, reset_secs: 60 });
/// assert!(breaker.try_acquire());
/// breaker.record_failure();
/// breaker.record_failure();
/// assert!(breaker.is_open());
/// assert!(!breaker.try_acquire());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    // A panic while holding the lock leaves only counters behind, safe to reuse
    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reset_window(&self) -> Duration {
        Duration::from_secs(self.config.reset_secs)
    }

    fn within_window(&self, since: Option<Instant>) -> bool {
        since.is_some_and(|at| at.elapsed() < self.reset_window())
    }

    /// `true` while calls are rejected: open, or half-open with the trial
    /// call already taken
    pub fn is_open(&self) -> bool {
        let state = self.state();
        state.failure_count >= self.config.failure_threshold
            && (self.within_window(state.last_failure) || self.within_window(state.trial_started))
    }

    /// Admit a call, claiming the trial slot when half-open
    ///
    /// Every admitted call must be followed by [`record_success`](Self::record_success)
    /// or [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state();
        if state.failure_count < self.config.failure_threshold {
            return true;
        }
        if self.within_window(state.last_failure) || self.within_window(state.trial_started) {
            return false;
        }
        state.trial_started = Some(Instant::now());
        true
    }

    pub fn record_failure(&self) {
        let mut state = self.state();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());
        state.trial_started = None;
    }

    pub fn record_success(&self) {
        *self.state() = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }
}
