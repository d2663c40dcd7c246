use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::cache::OrderCache;
use crate::domain::order::{validate, Order, ValidationError};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};
use crate::utils::IsTransient;

// ============================================================================
// Ingest Pipeline - bus payload → validated → persisted → cached
// ============================================================================
//
//   Received → Decoded → Validated → Persisted → Cached → Done
//       └──────────┴──────────┴─────────→ Abandoned
//
// Each message runs the stages strictly in order. The cache is written only
// after the store has committed, so a cached entry is always a committed
// state. Persist + cache for one message happen under `serial`, which keeps
// the cache in the same order as store commits even if several deliveries
// are processed at once.
//
// The pipeline never retries. What happens to a failed message on the bus
// is decided by the subscriber's FailurePolicy.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Validated,
    Persisted,
    Cached,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::Validated => "validated",
            Stage::Persisted => "persisted",
            Stage::Cached => "cached",
            Stage::Done => "done",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to persist order {order_uid}: {source}")]
    Store {
        order_uid: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// Last stage the message reached before it was abandoned.
    pub fn abandoned_at(&self) -> Stage {
        match self {
            IngestError::Decode(_) => Stage::Received,
            IngestError::Validation(_) => Stage::Decoded,
            IngestError::Store { .. } => Stage::Validated,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode",
            IngestError::Validation(e) => e.reason(),
            IngestError::Store { .. } => "store",
        }
    }
}

impl IsTransient for IngestError {
    fn is_transient(&self) -> bool {
        match self {
            IngestError::Store { source, .. } => source.is_transient(),
            IngestError::Decode(_) | IngestError::Validation(_) => false,
        }
    }
}

/// Summary of a message that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub order_uid: String,
    pub item_count: usize,
}

pub struct IngestPipeline {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
    serial: Mutex<()>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            cache,
            metrics,
            serial: Mutex::new(()),
        }
    }

    /// Run one raw bus payload through the pipeline.
    pub async fn process(&self, payload: &[u8]) -> Result<Processed, IngestError> {
        let started = Instant::now();
        let result = self.run(payload).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(processed) => {
                tracing::info!(
                    order_uid = %processed.order_uid,
                    item_count = processed.item_count,
                    "Order processed successfully"
                );
                self.metrics.record_ingested(elapsed, self.cache.len());
            }
            Err(e) => {
                let stage = e.abandoned_at();
                match e {
                    IngestError::Store { .. } => tracing::error!(
                        stage = stage.as_str(),
                        error = %e,
                        "Message abandoned"
                    ),
                    _ => tracing::warn!(
                        stage = stage.as_str(),
                        error = %e,
                        "Message abandoned"
                    ),
                }
                self.metrics.record_abandoned(stage.as_str(), e.reason(), elapsed);
            }
        }

        result
    }

    async fn run(&self, payload: &[u8]) -> Result<Processed, IngestError> {
        tracing::debug!(
            payload = %String::from_utf8_lossy(payload),
            "Received message"
        );

        let order = Order::from_payload(payload)?;
        tracing::trace!(order_uid = %order.order_uid, stage = Stage::Decoded.as_str(), "Stage reached");

        validate(&order)?;
        tracing::trace!(order_uid = %order.order_uid, stage = Stage::Validated.as_str(), "Stage reached");

        let _serial = self.serial.lock().await;

        if let Err(source) = self.store.save(&order).await {
            return Err(IngestError::Store {
                order_uid: order.order_uid,
                source,
            });
        }
        tracing::trace!(order_uid = %order.order_uid, stage = Stage::Persisted.as_str(), "Stage reached");

        let processed = Processed {
            order_uid: order.order_uid.clone(),
            item_count: order.items.len(),
        };
        self.cache.set(order);
        tracing::trace!(order_uid = %processed.order_uid, stage = Stage::Cached.as_str(), "Stage reached");

        Ok(processed)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Delivery;
    use crate::store::memory::InMemoryOrderStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline(store: Arc<dyn OrderStore>) -> (IngestPipeline, Arc<OrderCache>, Arc<Metrics>) {
        let cache = Arc::new(OrderCache::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        (
            IngestPipeline::new(store, cache.clone(), metrics.clone()),
            cache,
            metrics,
        )
    }

    fn payload(uid: &str, track: &str, transaction: &str, items: usize) -> Vec<u8> {
        let items: Vec<_> = (0..items)
            .map(|i| serde_json::json!({"chrt_id": i, "name": format!("item-{i}"), "price": 100}))
            .collect();
        serde_json::json!({
            "order_uid": uid,
            "track_number": track,
            "entry": "WBIL",
            "delivery": {"name": "Test Testov", "city": "Kiryat Mozkin"},
            "payment": {"transaction": transaction, "currency": "USD", "amount": 1817},
            "items": items,
            "locale": "en",
            "date_created": "2021-11-26T06:22:19Z"
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_valid_message_is_persisted_then_cached() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, metrics) = pipeline(store.clone());

        let processed = pipeline
            .process(br#"{"order_uid":"A1","track_number":"T1","payment":{"transaction":"TX1"}}"#)
            .await
            .unwrap();

        assert_eq!(processed.order_uid, "A1");
        assert_eq!(store.save_count(), 1);
        assert!(store.snapshot().contains_key("A1"));
        assert_eq!(cache.get("A1").unwrap().track_number, "T1");
        assert_eq!(metrics.orders_ingested.get(), 1);
    }

    #[tokio::test]
    async fn test_empty_order_uid_touches_nothing() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        let err = pipeline.process(&payload("", "T1", "TX1", 1)).await.unwrap_err();

        assert!(matches!(err, IngestError::Validation(ValidationError::MissingOrderUid)));
        assert_eq!(store.save_count(), 0);
        assert!(cache.is_empty());
        assert!(cache.get("").is_none());
    }

    #[tokio::test]
    async fn test_every_missing_required_field_abandons_before_side_effects() {
        let cases = [
            (payload("", "T1", "TX1", 1), ValidationError::MissingOrderUid),
            (payload("A1", "", "TX1", 1), ValidationError::MissingTrackNumber),
            (payload("A1", "T1", "", 1), ValidationError::MissingTransaction),
        ];

        for (message, expected) in cases {
            let store = Arc::new(InMemoryOrderStore::new());
            let (pipeline, cache, metrics) = pipeline(store.clone());

            let err = pipeline.process(&message).await.unwrap_err();

            assert_eq!(err.abandoned_at(), Stage::Decoded);
            assert!(matches!(&err, IngestError::Validation(v) if *v == expected));
            assert_eq!(store.save_count(), 0);
            assert!(cache.is_empty());
            assert_eq!(
                metrics
                    .ingest_abandoned
                    .with_label_values(&["decoded", expected.reason()])
                    .get(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_null_delivery_is_stored_as_zero_record() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        pipeline
            .process(br#"{"order_uid":"A1","track_number":"T1","delivery":null,"payment":{"transaction":"TX1"}}"#)
            .await
            .unwrap();

        assert_eq!(store.snapshot()["A1"].delivery, Delivery::default());
        assert_eq!(cache.get("A1").unwrap().delivery, Delivery::default());
    }

    #[tokio::test]
    async fn test_null_payment_fails_validation_not_decoding() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        let err = pipeline
            .process(br#"{"order_uid":"A1","track_number":"T1","payment":null}"#)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Validation(ValidationError::MissingTransaction)));
        assert_eq!(err.abandoned_at(), Stage::Decoded);
        assert_eq!(store.save_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_abandoned_at_received() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        let err = pipeline.process(b"\x00not json").await.unwrap_err();

        assert!(matches!(err, IngestError::Decode(_)));
        assert_eq!(err.abandoned_at(), Stage::Received);
        assert!(!err.is_transient());
        assert_eq!(store.save_count(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_cache_untouched() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        pipeline.process(&payload("A1", "T1", "TX1", 2)).await.unwrap();
        store.fail_saves(true);

        let err = pipeline.process(&payload("A1", "T2", "TX2", 0)).await.unwrap_err();

        assert_eq!(err.abandoned_at(), Stage::Validated);
        assert!(err.is_transient());
        let cached = cache.get("A1").unwrap();
        assert_eq!(cached.track_number, "T1");
        assert_eq!(cached.items.len(), 2);

        let err = pipeline.process(&payload("A2", "T1", "TX1", 0)).await.unwrap_err();
        assert!(matches!(err, IngestError::Store { ref order_uid, .. } if order_uid == "A2"));
        assert!(cache.get("A2").is_none());
    }

    #[tokio::test]
    async fn test_same_message_twice_is_idempotent() {
        let message = payload("A1", "T1", "TX1", 3);

        let once_store = Arc::new(InMemoryOrderStore::new());
        let (once, once_cache, _) = pipeline(once_store.clone());
        once.process(&message).await.unwrap();

        let twice_store = Arc::new(InMemoryOrderStore::new());
        let (twice, twice_cache, _) = pipeline(twice_store.clone());
        twice.process(&message).await.unwrap();
        twice.process(&message).await.unwrap();

        assert_eq!(once_store.snapshot(), twice_store.snapshot());
        assert_eq!(once_cache.get_all(), twice_cache.get_all());
    }

    #[tokio::test]
    async fn test_later_message_fully_replaces_order() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());

        pipeline.process(&payload("A1", "T1", "TX1", 3)).await.unwrap();
        pipeline
            .process(br#"{"order_uid":"A1","track_number":"T2","payment":{"transaction":"TX2"}}"#)
            .await
            .unwrap();

        let cached = cache.get("A1").unwrap();
        assert_eq!(cached.track_number, "T2");
        assert!(cached.items.is_empty());
        assert!(cached.delivery.city.is_empty());
        assert_eq!(store.snapshot()["A1"], cached);
    }

    /// Records whether the cache already held the order being saved.
    struct CacheAheadDetector {
        inner: InMemoryOrderStore,
        cache: Arc<OrderCache>,
        violations: AtomicUsize,
    }

    #[async_trait]
    impl OrderStore for CacheAheadDetector {
        async fn save(&self, order: &Order) -> Result<(), StoreError> {
            if self.cache.get(&order.order_uid).as_ref() == Some(order) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.save(order).await
        }

        async fn load_one(&self, uid: &str) -> Result<Order, StoreError> {
            self.inner.load_one(uid).await
        }

        async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_uids().await
        }
    }

    #[tokio::test]
    async fn test_cache_never_written_ahead_of_store() {
        let cache = Arc::new(OrderCache::new());
        let store = Arc::new(CacheAheadDetector {
            inner: InMemoryOrderStore::new(),
            cache: cache.clone(),
            violations: AtomicUsize::new(0),
        });
        let pipeline = IngestPipeline::new(
            store.clone(),
            cache.clone(),
            Arc::new(Metrics::new().unwrap()),
        );

        for (track, items) in [("T1", 1), ("T2", 2), ("T3", 0)] {
            pipeline.process(&payload("A1", track, "TX1", items)).await.unwrap();
        }

        assert_eq!(store.violations.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get("A1").unwrap().track_number, "T3");
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_leave_cache_matching_store() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (pipeline, cache, _) = pipeline(store.clone());
        let pipeline = Arc::new(pipeline);

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let uid = if i % 2 == 0 { "A1" } else { "A2" };
                    pipeline
                        .process(&payload(uid, &format!("T{i}"), "TX", i % 4))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(cache.get("A1").as_ref(), snapshot.get("A1"));
        assert_eq!(cache.get("A2").as_ref(), snapshot.get("A2"));
        assert_eq!(store.save_count(), 32);
    }
}
