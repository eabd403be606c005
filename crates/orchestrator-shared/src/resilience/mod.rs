//! Resilience primitives shared by components that call flaky external
//! collaborators. Currently just the circuit breaker; applied at the
//! Sandbox Manager's container-platform boundary (see `orchestrator-sandbox`).

mod behavior;
mod circuit_breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::{CircuitBreakerMetrics, MetricsExporter, TracingMetricsExporter};
