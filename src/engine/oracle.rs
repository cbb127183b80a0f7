//! Exchange rate from the spot-price endpoint.
//!
//! One throttled call returns USD prices for both assets; the rate is
//! price(base) / price(quote). Failures are data-integrity errors and are
//! never retried here.

use ethers::types::Address;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::api::OrderBook;
use crate::error::LadderError;

pub struct PriceOracle {
    book: Arc<dyn OrderBook>,
    base: Address,
    quote: Address,
}

impl PriceOracle {
    pub fn new(book: Arc<dyn OrderBook>, base: Address, quote: Address) -> Self {
        Self { book, base, quote }
    }

    /// Units of `quote` per unit of `base`.
    pub async fn rate(&self) -> Result<Decimal, LadderError> {
        let base = format!("{:?}", self.base);
        let quote = format!("{:?}", self.quote);
        let prices = self.book.spot_prices(&[base.clone(), quote.clone()]).await?;

        let base_price = lookup_price(&prices, &base)?;
        let quote_price = lookup_price(&prices, &quote)?;
        if quote_price.is_zero() {
            return Err(LadderError::DataIntegrity(format!("quote asset {quote} priced at zero")));
        }

        let rate = base_price.checked_div(quote_price).ok_or_else(|| {
            LadderError::DataIntegrity(format!("rate {base_price} / {quote_price} is out of range"))
        })?;
        debug!(base_price = %base_price, quote_price = %quote_price, rate = %rate, "Spot rate");
        Ok(rate)
    }
}

/// Case-insensitive lookup of an asset's price.
fn lookup_price(prices: &HashMap<String, String>, asset: &str) -> Result<Decimal, LadderError> {
    let raw = prices
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(asset))
        .map(|(_, price)| price)
        .ok_or_else(|| LadderError::DataIntegrity(format!("no spot price for {asset}")))?;

    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|e| LadderError::DataIntegrity(format!("unparseable price {raw:?} for {asset}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
