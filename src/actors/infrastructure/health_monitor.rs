use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::messaging::DeadLetterPublisher;
use crate::metrics::Metrics;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Components push their state with UpdateHealth; the HTTP surface reads the
// aggregate with GetSystemHealth. The dead-letter producer is polled instead,
// since its circuit can close again without any message flowing.
//
// ============================================================================

const CIRCUIT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Names of the tracked components.
pub mod component {
    pub const STORE: &str = "store";
    pub const SUBSCRIBER: &str = "subscriber";
    pub const DEAD_LETTER: &str = "dead_letter";
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl UpdateHealth {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

#[derive(Default)]
pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    dead_letter: Option<Arc<DeadLetterPublisher>>,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll the dead-letter producer's circuit breaker.
    pub fn with_dead_letter(mut self, publisher: Arc<DeadLetterPublisher>, metrics: Arc<Metrics>) -> Self {
        self.dead_letter = Some(publisher);
        self.metrics = Some(metrics);
        self
    }

    fn record(&mut self, component: String, status: HealthStatus, details: Option<String>) {
        tracing::debug!(component = %component, status = ?status, "Updated component health");
        let health = ComponentHealth::new(component.clone(), status).with_details(details);
        self.components.insert(component, health);
    }

    fn observe_circuit(&mut self, state: CircuitState) {
        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(state.as_gauge());
        }

        let status = match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("circuit breaker open".to_string()),
        };
        self.record(component::DEAD_LETTER.to_string(), status, None);
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut degraded = Vec::new();
        let mut unhealthy = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{name}: {msg}")),
                HealthStatus::Degraded(msg) => degraded.push(format!("{name}: {msg}")),
                HealthStatus::Healthy => {}
            }
        }
        unhealthy.sort();
        degraded.sort();

        if !unhealthy.is_empty() {
            HealthStatus::Unhealthy(unhealthy.join(", "))
        } else if !degraded.is_empty() {
            HealthStatus::Degraded(degraded.join(", "))
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");

        ctx.run_interval(CIRCUIT_POLL_INTERVAL, |act, ctx| {
            let Some(publisher) = act.dead_letter.clone() else {
                return;
            };
            ctx.spawn(
                async move { publisher.circuit_state().await }
                    .into_actor(act)
                    .map(|state, act, _ctx| act.observe_circuit(state)),
            );
        });

        ctx.run_interval(STATUS_LOG_INTERVAL, |act, _ctx| {
            match act.compute_overall_status() {
                HealthStatus::Healthy => tracing::info!("System healthy"),
                HealthStatus::Degraded(reason) => tracing::warn!(reason = %reason, "System degraded"),
                HealthStatus::Unhealthy(reason) => tracing::error!(reason = %reason, "System unhealthy"),
            }
        });
    }
}

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        self.record(msg.component, msg.status, msg.details);
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
