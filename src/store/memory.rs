use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{OrderStore, StoreError};
use crate::domain::order::Order;

/// In-process stand-in for PostgreSQL with failure injection.
#[derive(Default)]
pub(crate) struct InMemoryOrderStore {
    orders: Mutex<BTreeMap<String, Order>>,
    broken: Mutex<HashSet<String>>,
    fail_saves: AtomicBool,
    fail_listing: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail with a transient error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make `load_one(uid)` fail while leaving the order listed.
    pub fn break_hydration(&self, uid: &str) {
        self.broken.lock().unwrap().insert(uid.to_string());
    }

    /// Number of `save` calls, successful or not.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BTreeMap<String, Order> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.orders
            .lock()
            .unwrap()
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn load_one(&self, uid: &str) -> Result<Order, StoreError> {
        if self.broken.lock().unwrap().contains(uid) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        self.orders
            .lock()
            .unwrap()
            .get(uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))
    }

    async fn list_uids(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(self.orders.lock().unwrap().keys().cloned().collect())
    }
}
