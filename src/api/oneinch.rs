//! 1inch orderbook and spot-price integration.
//!
//! Orderbook API: https://api.1inch.dev/orderbook/v4.0/{chain}
//! Spot price API: https://api.1inch.dev/price/v1.1/{chain}/{addresses}
//! Auth: `Authorization: Bearer {key}` on every request.
//!
//! The orderbook refuses lookups for roughly a second after submission, so
//! callers must wait out a settle delay before `order_by_hash`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::client::{Headers, HttpTransport, ReqwestTransport, ThrottledClient};
use super::retry::RetryPolicy;
use super::{BatchCanceller, OrderBook};
use crate::chain::signer::SignedOrder;
use crate::error::LadderError;
use crate::types::{CancelBatch, OrderRecord};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.1inch.dev";
const ORDERBOOK_VERSION: &str = "v4.0";
const PRICE_VERSION: &str = "v1.1";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OneInchClient<T: HttpTransport = ReqwestTransport> {
    client: ThrottledClient<T>,
    base_url: String,
    chain_id: u64,
    api_key: SecretString,
}

impl<T: HttpTransport> OneInchClient<T> {
    pub fn new(client: ThrottledClient<T>, base_url: &str, chain_id: u64, api_key: SecretString) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            api_key,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn headers(&self) -> Headers {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key.expose_secret()),
            ),
            ("accept".to_string(), "application/json".to_string()),
        ]
    }

    fn orderbook_url(&self) -> String {
        format!("{}/orderbook/{ORDERBOOK_VERSION}/{}", self.base_url, self.chain_id)
    }

    /// Raw GET through the throttle gate.
    pub async fn get(&self, url: &str, headers: &Headers) -> Result<Value, LadderError> {
        self.client.get(url, headers).await
    }

    /// Raw POST through the throttle gate.
    pub async fn post(&self, url: &str, body: &Value, headers: &Headers) -> Result<Value, LadderError> {
        self.client.post(url, body, headers).await
    }

    /// USD spot prices for `assets` on `chain_id`, keyed by address.
    pub async fn spot_price(
        &self,
        chain_id: u64,
        assets: &[String],
    ) -> Result<HashMap<String, String>, LadderError> {
        let url = format!(
            "{}/price/{PRICE_VERSION}/{chain_id}/{}?currency=USD",
            self.base_url,
            assets.join(","),
        );
        let value = self.client.get(&url, &self.headers()).await?;
        parse_price_map(&value)
    }
}

/// Prices come back as `{ "0xabc...": "1234.5", ... }`. Numbers are
/// tolerated and stringified.
pub fn parse_price_map(value: &Value) -> Result<HashMap<String, String>, LadderError> {
    let obj = value.as_object().ok_or_else(|| {
        LadderError::DataIntegrity(format!("spot price response is not an object: {value}"))
    })?;

    obj.iter()
        .map(|(asset, price)| {
            let price = match price {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(LadderError::DataIntegrity(format!(
                        "unexpected price for {asset}: {other}"
                    )))
                }
            };
            Ok((asset.clone(), price))
        })
        .collect()
}

#[async_trait]
impl<T: HttpTransport> OrderBook for OneInchClient<T> {
    async fn submit_order(&self, order: &SignedOrder) -> Result<(), LadderError> {
        let url = self.orderbook_url();
        debug!(order_hash = %order.order_hash, "Submitting order");
        self.client.post(&url, &order.payload(), &self.headers()).await?;
        Ok(())
    }

    async fn order_by_hash(&self, order_hash: &str) -> Result<OrderRecord, LadderError> {
        let url = format!("{}/order/{order_hash}", self.orderbook_url());
        // A late success after a retry could double count, so one shot only.
        let value = self
            .client
            .get_with(RetryPolicy::none(), &url, &self.headers())
            .await?;
        serde_json::from_value(value).map_err(|e| {
            LadderError::DataIntegrity(format!("malformed order record for {order_hash}: {e}"))
        })
    }

    async fn spot_prices(&self, assets: &[String]) -> Result<HashMap<String, String>, LadderError> {
        self.spot_price(self.chain_id, assets).await
    }
}

#[async_trait]
impl<T: HttpTransport> BatchCanceller for OneInchClient<T> {
    async fn cancel_batch(&self, batch: &CancelBatch) -> Result<(), LadderError> {
        let url = format!("{}/orders/cancel-batch", self.orderbook_url());
        let body = json!({
            "makerTraits": batch.trait_bits.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            "orderHashes": batch.order_hashes,
        });
        self.client.post(&url, &body, &self.headers()).await?;
        info!(count = batch.len(), "Cancelled order batch via API");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
