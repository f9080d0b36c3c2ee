//! Circuit breaker shared by every request made through one client
//!
//! Counts consecutive classified failures. At `FAILURE_THRESHOLD` the circuit
//! opens and requests fail fast with `CircuitOpen` until `COOLDOWN` has passed
//! since the last failure.
//!
//! The reset is lazy: `is_open` notices an expired cooldown, closes the circuit
//! and zeroes the counter on the spot. There is no half-open probe; after a
//! cooldown it takes a fresh run of `FAILURE_THRESHOLD` failures to reopen.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Consecutive failures that open the circuit.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit rejects requests after the last failure.
pub const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open: bool,
    last_failure: Option<Instant>,
}

/// Mutex-guarded failure counter with open/closed state.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<CircuitState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_limits(FAILURE_THRESHOLD, COOLDOWN)
    }

    /// Breaker with a custom threshold and cooldown. A zero threshold is
    /// treated as one.
    pub fn with_limits(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(CircuitState::default()),
        }
    }

    /// Clear the failure streak and close the circuit.
    pub fn record_success(&self) {
        let mut state = self.lock();
        let was_open = state.open;
        state.consecutive_failures = 0;
        state.open = false;
        if was_open {
            info!("circuit breaker closed after successful response");
        }
    }

    /// Count one failure. Returns true if this call opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());

        if !state.open && state.consecutive_failures >= self.threshold {
            state.open = true;
            warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker opened"
            );
            return true;
        }
        false
    }

    /// Whether requests should be rejected right now.
    pub fn is_open(&self) -> bool {
        let mut state = self.lock();
        if !state.open {
            return false;
        }

        let expired = state
            .last_failure
            .is_none_or(|at| at.elapsed() > self.cooldown);
        if expired {
            state.open = false;
            state.consecutive_failures = 0;
            info!("circuit breaker cooldown elapsed, allowing requests");
            return false;
        }
        true
    }

    /// Current failure streak.
    pub fn failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        // A panic while holding the lock cannot leave the counters half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
