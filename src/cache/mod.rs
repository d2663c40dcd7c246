use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::order::Order;

// ============================================================================
// In-Memory Order Cache
// ============================================================================
//
// Read-optimized mirror of the store, keyed by order_uid.
//
// - One reader/writer lock over the whole map. Writes are serialized
//   upstream by the ingest pipeline and are rare next to reads.
// - Whole orders are swapped in under the write lock, so readers never see a
//   half-written aggregate.
// - Every read hands out a deep clone (delivery, payment and the item vector
//   included). Callers can mutate what they get back freely.
// - The lock is never held across I/O.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `order.order_uid`.
    pub fn set(&self, order: Order) {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.insert(order.order_uid.clone(), order);
    }

    /// Isolated copy of the cached order, if any.
    pub fn get(&self, uid: &str) -> Option<Order> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        orders.get(uid).cloned()
    }

    /// Isolated snapshot of every cached order, taken under one read lock.
    pub fn get_all(&self) -> HashMap<String, Order> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        orders.clone()
    }

    /// Bulk load at startup. Later entries win on duplicate keys.
    pub fn restore(&self, restored: Vec<Order>) {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.reserve(restored.len());
        for order in restored {
            orders.insert(order.order_uid.clone(), order);
        }
    }

    pub fn len(&self) -> usize {
        self.orders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
