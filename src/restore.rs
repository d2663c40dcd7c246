use crate::cache::OrderCache;
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Startup Restoration
// ============================================================================
//
// Runs once, before the HTTP server and the subscriber start. A store that
// cannot be read does not stop the service: it starts with an empty cache
// and reports itself degraded until ingestion succeeds.
//
// ============================================================================

#[derive(Debug)]
pub enum RestoreOutcome {
    /// Cache filled from the store
    Warm { restored: usize },
    /// Store unreadable; cache left empty
    Degraded { error: StoreError },
}

impl RestoreOutcome {
    pub fn restored(&self) -> usize {
        match self {
            RestoreOutcome::Warm { restored } => *restored,
            RestoreOutcome::Degraded { .. } => 0,
        }
    }
}

/// Load every persisted order into `cache`.
pub async fn warm_cache(store: &dyn OrderStore, cache: &OrderCache) -> RestoreOutcome {
    match store.load_all().await {
        Ok(orders) => {
            let restored = orders.len();
            cache.restore(orders);
            tracing::info!(restored = restored, "Cache restored from store");
            RestoreOutcome::Warm { restored }
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Could not restore cache from store, starting cold"
            );
            RestoreOutcome::Degraded { error }
        }
    }
}
