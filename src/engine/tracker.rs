//! In-memory registry of orders believed to be resting on the book.
//!
//! Every method takes the lock for one short, synchronous step. The guard is
//! never held across an `.await`, so a sweep and an order creation can
//! interleave freely without losing entries.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::types::TrackedOrder;

#[derive(Debug, Default)]
pub struct OrderTracker {
    orders: Mutex<Vec<TrackedOrder>>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `order` unless its hash is already tracked. Returns whether it
    /// was added.
    pub fn record(&self, order: TrackedOrder) -> bool {
        let mut orders = self.orders.lock();
        if orders.iter().any(|o| o.order_hash == order.order_hash) {
            return false;
        }
        orders.push(order);
        true
    }

    /// Point-in-time copy of the tracked set, in insertion order.
    pub fn snapshot(&self) -> Vec<TrackedOrder> {
        self.orders.lock().clone()
    }

    /// Drop every order whose hash is in `hashes`. Returns how many went.
    pub fn remove<'a, I>(&self, hashes: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let doomed: HashSet<&str> = hashes.into_iter().collect();
        let mut orders = self.orders.lock();
        let before = orders.len();
        orders.retain(|o| !doomed.contains(o.order_hash.as_str()));
        before - orders.len()
    }

    pub fn contains(&self, order_hash: &str) -> bool {
        self.orders.lock().iter().any(|o| o.order_hash == order_hash)
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
