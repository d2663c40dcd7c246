mod health_monitor;

pub use health_monitor::{component, GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
