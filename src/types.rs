//! Shared types for the ladder agent.
//!
//! These types form the data model used across the api, chain and engine
//! modules. They carry no behaviour beyond formatting and small helpers so
//! every module can depend on them without circular references.

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LadderError;

// ---------------------------------------------------------------------------
// Order intent
// ---------------------------------------------------------------------------

/// One rung of the ladder, ready to be signed.
///
/// Amounts are in the smallest unit of each asset (18 decimals assumed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub making_amount: U256,
    pub taking_amount: U256,
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} for {} {:?}",
            format_units(self.making_amount),
            self.maker_asset,
            format_units(self.taking_amount),
            self.taker_asset,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracked order
// ---------------------------------------------------------------------------

/// An order the agent believes is resting on the remote book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    /// 0x-prefixed bytes32 hash.
    pub order_hash: String,
    /// Maker traits as reported by the orderbook.
    pub trait_bits: U256,
    /// Server creation time plus the configured expiration window.
    pub expires_at: DateTime<Utc>,
}

impl TrackedOrder {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Decode `order_hash` into the raw 32 bytes the router expects.
    pub fn hash_bytes(&self) -> Result<[u8; 32], LadderError> {
        hash_bytes(&self.order_hash)
    }
}

impl fmt::Display for TrackedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expires {})",
            self.order_hash,
            self.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// Lifecycle of a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    PendingSubmit,
    Live,
    /// Submitted, but the follow-up fetch failed so it is not tracked.
    Untracked,
    /// Expired naturally and dropped without a cancel call.
    Swept,
    Cancelled,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::PendingSubmit => write!(f, "PENDING_SUBMIT"),
            OrderState::Live => write!(f, "LIVE"),
            OrderState::Untracked => write!(f, "UNTRACKED"),
            OrderState::Swept => write!(f, "SWEPT"),
            OrderState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

/// Canonical order record returned by the orderbook lookup-by-hash.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_hash: String,
    pub create_date_time: String,
    pub data: OrderRecordData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecordData {
    pub maker_traits: String,
    #[serde(default)]
    pub maker_asset: Option<String>,
    #[serde(default)]
    pub taker_asset: Option<String>,
}

impl OrderRecord {
    pub fn created_at(&self) -> Result<DateTime<Utc>, LadderError> {
        DateTime::parse_from_rfc3339(&self.create_date_time)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                LadderError::DataIntegrity(format!(
                    "order {} has unparseable createDateTime {:?}: {e}",
                    self.order_hash, self.create_date_time
                ))
            })
    }

    pub fn trait_bits(&self) -> Result<U256, LadderError> {
        parse_u256(&self.data.maker_traits).ok_or_else(|| {
            LadderError::DataIntegrity(format!(
                "order {} has unparseable makerTraits {:?}",
                self.order_hash, self.data.maker_traits
            ))
        })
    }
}

/// Parallel arrays handed to the batch cancel call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelBatch {
    pub trait_bits: Vec<U256>,
    pub order_hashes: Vec<String>,
}

impl CancelBatch {
    pub fn push(&mut self, order: &TrackedOrder) {
        self.trait_bits.push(order.trait_bits);
        self.order_hashes.push(order.order_hash.clone());
    }

    pub fn len(&self) -> usize {
        self.order_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_hashes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a decimal or 0x-prefixed hex string into a U256.
pub fn parse_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => U256::from_dec_str(s).ok(),
    }
}

/// Decode a 0x-prefixed bytes32 hex string.
pub fn hash_bytes(hash: &str) -> Result<[u8; 32], LadderError> {
    let bytes = hex::decode(hash.trim_start_matches("0x"))
        .map_err(|e| LadderError::DataIntegrity(format!("bad order hash {hash}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| LadderError::DataIntegrity(format!("order hash {hash} is not 32 bytes")))
}

/// Render an 18-decimal integer amount as a human-readable decimal string.
pub fn format_units(amount: U256) -> String {
    let ether = ethers::utils::format_units(amount, 18).unwrap_or_else(|_| amount.to_string());
    let trimmed = ether.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
