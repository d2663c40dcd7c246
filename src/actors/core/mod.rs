mod health;

pub use health::{ComponentHealth, HealthStatus};
