//! Circuit breaker observability: a snapshot struct plus a small exporter
//! trait so call counts and state can be surfaced without coupling the
//! breaker itself to any particular metrics backend.

use super::CircuitState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub consecutive_failures: u32,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
            consecutive_failures: 0,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state != CircuitState::Open
    }

    pub fn state_description(&self) -> &'static str {
        match self.state {
            CircuitState::Closed => "closed (allowing calls)",
            CircuitState::Open => "open (failing fast)",
            CircuitState::HalfOpen => "half-open (trial call in flight)",
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "{} — {} calls, {} failures ({:.1}% failure rate)",
            self.state_description(),
            self.total_calls,
            self.total_failures,
            self.failure_rate() * 100.0
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Exports breaker state as log lines. A stand-in for a real metrics
/// backend: the spec's ambient stack asks for structured logging at
/// resilience boundaries, not a new telemetry pipeline.
pub trait MetricsExporter {
    fn export(&self, name: &str, metrics: &CircuitBreakerMetrics);
}

#[derive(Debug, Default)]
pub struct TracingMetricsExporter;

impl MetricsExporter for TracingMetricsExporter {
    fn export(&self, name: &str, metrics: &CircuitBreakerMetrics) {
        tracing::info!(
            breaker = name,
            state = ?metrics.state,
            total_calls = metrics.total_calls,
            total_failures = metrics.total_failures,
            failure_rate = metrics.failure_rate(),
            "circuit breaker metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_start_closed_and_empty() {
        let metrics = CircuitBreakerMetrics::new();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.failure_rate(), 0.0);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn failure_rate_divides_failures_by_calls() {
        let metrics = CircuitBreakerMetrics {
            total_calls: 4,
            total_failures: 1,
            ..CircuitBreakerMetrics::new()
        };
        assert_eq!(metrics.failure_rate(), 0.25);
    }

    #[test]
    fn open_state_is_not_healthy() {
        let metrics = CircuitBreakerMetrics {
            state: CircuitState::Open,
            ..CircuitBreakerMetrics::new()
        };
        assert!(!metrics.is_healthy());
    }

    #[test]
    fn format_summary_includes_state_description() {
        let metrics = CircuitBreakerMetrics::new();
        assert!(metrics.format_summary().contains("closed"));
    }
}
