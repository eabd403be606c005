//! Concrete circuit breaker state machine.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::behavior::CircuitBreakerBehavior;
use super::metrics::CircuitBreakerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before trialing a half-open call.
    pub open_duration: Duration,
    /// Consecutive successes while half-open before the breaker closes.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    opened_at: Option<Instant>,
}

/// Fault-isolation wrapper for a flaky external collaborator (the container
/// platform, concretely). Gates "protected" calls behind `should_allow`;
/// callers bypass the breaker entirely for operations that must never be
/// blocked (health checks, best-effort cleanup).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                total_calls: 0,
                total_failures: 0,
                total_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Transitions an open breaker whose cooldown has elapsed into
    /// half-open. Called at the top of `should_allow`.
    fn maybe_recover(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                }
            }
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_recover(&mut inner);
        inner.state
    }

    fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_recover(&mut inner);
        inner.total_calls += 1;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_failures += 1;
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    fn force_open(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    fn force_closed(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_recover(&mut inner);
        CircuitBreakerMetrics {
            state: inner.state,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            consecutive_failures: inner.consecutive_failures,
        }
    }
}
