//! Remote orderbook access.
//!
//! Defines the `OrderBook` and `BatchCanceller` traits the engine talks to,
//! and the throttled HTTP client the 1inch implementation is built on.

pub mod client;
pub mod oneinch;
pub mod retry;
pub mod throttle;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::chain::signer::SignedOrder;
use crate::error::LadderError;
use crate::types::{CancelBatch, OrderRecord};

/// Orderbook operations used by the lifecycle engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBook: Send + Sync {
    /// Submit a signed order. Transient failures are retried by the client.
    async fn submit_order(&self, order: &SignedOrder) -> Result<(), LadderError>;

    /// Fetch the canonical record of a submitted order. Single attempt.
    async fn order_by_hash(&self, order_hash: &str) -> Result<OrderRecord, LadderError>;

    /// USD spot prices keyed by asset address.
    async fn spot_prices(&self, assets: &[String]) -> Result<HashMap<String, String>, LadderError>;
}

/// Cancels a batch of orders in one call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchCanceller: Send + Sync {
    async fn cancel_batch(&self, batch: &CancelBatch) -> Result<(), LadderError>;
}
