//! Ladder planning: from a base quantity and a market rate to N order
//! intents whose taking amounts climb by a fixed percentage per rung.
//!
//! Everything here is pure `Decimal` arithmetic. Amounts are scaled to
//! 18-decimal integers only at the very end.

use ethers::types::{Address, U256};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::LadderError;
use crate::types::OrderIntent;

/// 10^18, the smallest-unit scale assumed for every asset.
const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;

/// Random quantities are drawn on a 10^-6 grid.
const QUANTITY_DECIMALS: u32 = 6;

/// `rate * base_quantity * (1 + step_percent * i / 100)`
///
/// Fails with a data-integrity error when the product leaves `Decimal`'s
/// range, which only happens for absurd rates.
pub fn taking_amount(
    rate: Decimal,
    base_quantity: Decimal,
    step_percent: Decimal,
    rung: u32,
) -> Result<Decimal, LadderError> {
    step_percent
        .checked_mul(Decimal::from(rung))
        .and_then(|bump| bump.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|bump| Decimal::ONE.checked_add(bump))
        .and_then(|markup| rate.checked_mul(base_quantity)?.checked_mul(markup))
        .ok_or_else(|| {
            LadderError::DataIntegrity(format!(
                "taking amount overflows for rate {rate}, quantity {base_quantity}, rung {rung}"
            ))
        })
}

/// Scale a decimal amount to its 18-decimal integer form, rounding half away
/// from zero at the last place.
pub fn to_wei(amount: Decimal) -> Result<U256, LadderError> {
    if amount.is_sign_negative() {
        return Err(LadderError::DataIntegrity(format!("negative amount {amount}")));
    }
    amount
        .checked_mul(Decimal::from(WEI_PER_UNIT))
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|scaled| scaled.to_u128())
        .map(U256::from)
        .ok_or_else(|| LadderError::DataIntegrity(format!("amount {amount} does not fit in wei")))
}

/// Number of 10^-6 grid steps between `min` and `max`.
pub fn quantity_steps(min: Decimal, max: Decimal) -> Result<i64, LadderError> {
    if max <= min {
        return Ok(0);
    }
    max.checked_sub(min)
        .and_then(|span| span.checked_mul(Decimal::from(10u64.pow(QUANTITY_DECIMALS))))
        .and_then(|scaled| scaled.trunc().to_i64())
        .ok_or_else(|| LadderError::DataIntegrity(format!("quantity range [{min}, {max}] is too wide")))
}

/// Uniform base quantity in `[min, max]` on a 10^-6 grid.
pub fn random_quantity<R: Rng + ?Sized>(min: Decimal, max: Decimal, rng: &mut R) -> Result<Decimal, LadderError> {
    let steps = quantity_steps(min, max)?;
    let k = rng.gen_range(0..=steps);
    min.checked_add(Decimal::new(k, QUANTITY_DECIMALS))
        .map(|q| q.normalize())
        .ok_or_else(|| LadderError::DataIntegrity(format!("quantity {min} + {k}e-6 overflows")))
}

#[derive(Debug, Clone)]
pub struct LadderPlanner {
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub step_percent: Decimal,
    pub order_count: u32,
}

impl LadderPlanner {
    pub fn new(maker_asset: Address, taker_asset: Address, step_percent: Decimal, order_count: u32) -> Self {
        Self {
            maker_asset,
            taker_asset,
            step_percent,
            order_count,
        }
    }

    /// Intent for rung `rung` (1-based).
    pub fn plan_rung(&self, rate: Decimal, base_quantity: Decimal, rung: u32) -> Result<OrderIntent, LadderError> {
        let taking = taking_amount(rate, base_quantity, self.step_percent, rung)?;
        Ok(OrderIntent {
            maker_asset: self.maker_asset,
            taker_asset: self.taker_asset,
            making_amount: to_wei(base_quantity)?,
            taking_amount: to_wei(taking)?,
        })
    }

    /// All rungs `1..=order_count` at a single rate.
    pub fn plan_ladder(&self, rate: Decimal, base_quantity: Decimal) -> Result<Vec<OrderIntent>, LadderError> {
        (1..=self.order_count)
            .map(|rung| self.plan_rung(rate, base_quantity, rung))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
