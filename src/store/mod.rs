// ============================================================================
// Order Store - durable source of truth
// ============================================================================
//
// The store owns four record sets per order: header, delivery, payment and
// items. Implementations must make `save` a full replace that is either
// entirely visible or not visible at all.
//
// Bulk loading is built from the single-order hydration primitive so there
// is exactly one place that knows how to reassemble an aggregate.
//
// ============================================================================

mod postgres;
#[cfg(test)]
pub(crate) mod memory;

pub use postgres::{connect, PgOrderStore};

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::domain::order::Order;
use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("order not found: {0}")]
    NotFound(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::NotFound(_) => false,
            StoreError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                // 08: connection exception, 40: transaction rollback
                // (serialization failure, deadlock), 57P: admin shutdown.
                sqlx::Error::Database(db) => db
                    .code()
                    .map(|code| {
                        code.starts_with("08") || code.starts_with("40") || code.starts_with("57P")
                    })
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically replace everything stored under `order.order_uid`.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// Hydrate one order: header, delivery, payment and items.
    async fn load_one(&self, uid: &str) -> Result<Order, StoreError>;

    /// Keys of every persisted order.
    async fn list_uids(&self) -> Result<Vec<String>, StoreError>;

    /// Every persisted order, fully hydrated.
    ///
    /// Orders that fail to hydrate are logged and skipped; only a failure to
    /// enumerate the keys fails the whole load.
    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        let uids = self.list_uids().await?;
        let mut orders = Vec::with_capacity(uids.len());

        for uid in uids {
            match self.load_one(&uid).await {
                Ok(order) => orders.push(order),
                Err(e) => {
                    tracing::warn!(
                        order_uid = %uid,
                        error = %e,
                        "Skipping order that failed to load"
                    );
                }
            }
        }

        tracing::debug!(count = orders.len(), "Loaded orders from store");
        Ok(orders)
    }
}

/// Bound a store operation by `limit`. An elapsed deadline becomes
/// `StoreError::Timeout`; the inner future is dropped, which rolls back any
/// open transaction.
pub async fn bounded<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryOrderStore;
    use super::*;
    use crate::domain::order::{Item, Payment};

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            track_number: format!("track-{uid}"),
            payment: Payment {
                transaction: format!("tx-{uid}"),
                ..Default::default()
            },
            items: vec![Item::default(), Item::default()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_all_hydrates_every_order() {
        let store = InMemoryOrderStore::new();
        for uid in ["B1", "B2", "B3"] {
            store.save(&order(uid)).await.unwrap();
        }

        let mut loaded = store.load_all().await.unwrap();
        loaded.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));

        assert_eq!(loaded, vec![order("B1"), order("B2"), order("B3")]);
    }

    #[tokio::test]
    async fn test_load_all_skips_orders_that_fail_to_hydrate() {
        let store = InMemoryOrderStore::new();
        for uid in ["B1", "B2", "B3"] {
            store.save(&order(uid)).await.unwrap();
        }
        store.break_hydration("B2");

        let loaded = store.load_all().await.unwrap();
        let uids: Vec<_> = loaded.iter().map(|o| o.order_uid.as_str()).collect();

        assert_eq!(uids.len(), 2);
        assert!(uids.contains(&"B1"));
        assert!(uids.contains(&"B3"));
    }

    #[tokio::test]
    async fn test_load_all_fails_when_keys_unavailable() {
        let store = InMemoryOrderStore::new();
        store.save(&order("B1")).await.unwrap();
        store.fail_listing(true);

        assert!(store.load_all().await.is_err());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = bounded(Duration::from_secs(1), async {
            Err::<(), _>(StoreError::NotFound("A1".to_string()))
        })
        .await;
        assert!(matches!(err, Err(StoreError::NotFound(uid)) if uid == "A1"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::NotFound("A1".to_string()).is_transient());
    }
}
