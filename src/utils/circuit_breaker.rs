use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards an outbound dependency (the dead-letter producer). After enough
// consecutive failures calls are rejected without touching the dependency,
// until a cool-down has passed and a probe succeeds.
//
//   Closed --failures >= threshold--> Open --cool-down--> HalfOpen
//   HalfOpen --successes >= threshold--> Closed
//   HalfOpen --any failure--> Open
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Encoding used by the `circuit_breaker_state` gauge.
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed
    pub cool_down: Duration,
    /// Successful probes needed to close from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct Counters {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    counters: Arc<Mutex<Counters>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            counters: Arc::new(Mutex::new(Counters {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(e))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.counters.lock().await.state
    }

    async fn admit(&self) -> bool {
        let mut c = self.counters.lock().await;
        if c.state != CircuitState::Open {
            return true;
        }

        let cooled = c
            .opened_at
            .map(|at| at.elapsed() >= self.config.cool_down)
            .unwrap_or(true);
        if !cooled {
            return false;
        }

        tracing::info!(breaker = self.name, "Circuit breaker half-open, probing");
        c.state = CircuitState::HalfOpen;
        c.successes = 0;
        true
    }

    async fn on_success(&self) {
        let mut c = self.counters.lock().await;
        match c.state {
            CircuitState::Closed => c.failures = 0,
            CircuitState::HalfOpen => {
                c.successes += 1;
                if c.successes >= self.config.success_threshold {
                    tracing::info!(breaker = self.name, "Circuit breaker closed");
                    c.state = CircuitState::Closed;
                    c.failures = 0;
                    c.successes = 0;
                    c.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut c = self.counters.lock().await;
        c.failures += 1;

        let reopen = match c.state {
            CircuitState::Closed => c.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if reopen {
            tracing::warn!(
                breaker = self.name,
                failures = c.failures,
                "Circuit breaker opened"
            );
            c.state = CircuitState::Open;
            c.successes = 0;
            c.opened_at = Some(Instant::now());
        }
    }
}
