// ============================================================================
// Actors Module
// ============================================================================
//
// Actors are reserved for infrastructure concerns. The ingest path itself is
// plain async code; only health aggregation lives in an actor.
//
// Structure:
// - core/           - Health status types
// - infrastructure/ - HealthMonitorActor and its messages
//
// ============================================================================

mod core;
mod infrastructure;

pub use core::{ComponentHealth, HealthStatus};
pub use infrastructure::{component, GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
