//! Object-safe circuit breaker contract, kept separate from the concrete
//! state machine so call sites that genuinely need a trait object (rather
//! than the usual enum-dispatch-over-a-closed-set) still have one to reach
//! for.

use std::fmt::Debug;

use super::metrics::CircuitBreakerMetrics;
use super::CircuitState;

pub trait CircuitBreakerBehavior: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self);
    fn record_failure(&self);
    fn is_healthy(&self) -> bool {
        self.state() != CircuitState::Open
    }
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}
