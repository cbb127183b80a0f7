//! 1inch Limit Order Protocol v4 orders: maker traits, EIP-712 hashing and
//! signing.
//!
//! The order hash is the EIP-712 digest over the aggregation router domain,
//! and that same digest is what the wallet signs.

use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use rand::Rng;
use serde_json::{json, Value};
use std::fmt;

use crate::error::LadderError;
use crate::types::OrderIntent;

/// Aggregation router v6, the verifying contract for v4 limit orders.
pub const AGGREGATION_ROUTER_V6: &str = "0x111111125421cA6dc452d289314280a0f8842A65";

const DOMAIN_NAME: &str = "1inch Aggregation Router";
const DOMAIN_VERSION: &str = "6";

const ORDER_TYPE: &[u8] = b"Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)";
const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Salts are drawn from [0, SALT_BOUND).
const SALT_BOUND: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Maker traits
// ---------------------------------------------------------------------------

const NO_PARTIAL_FILLS_FLAG: usize = 255;
const ALLOW_MULTIPLE_FILLS_FLAG: usize = 254;
const EXPIRATION_OFFSET: usize = 80;
const EXPIRATION_BITS: usize = 40;

/// 256-bit maker traits: flag bits at the top, expiration at bits 80..120.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MakerTraits(U256);

impl MakerTraits {
    pub fn with_expiration(self, unix_secs: u64) -> Self {
        let mask = ((U256::one() << EXPIRATION_BITS) - 1) << EXPIRATION_OFFSET;
        let value = (U256::from(unix_secs) << EXPIRATION_OFFSET) & mask;
        Self((self.0 & !mask) | value)
    }

    pub fn allow_partial_fills(self) -> Self {
        Self(self.0 & !(U256::one() << NO_PARTIAL_FILLS_FLAG))
    }

    pub fn allow_multiple_fills(self) -> Self {
        Self(self.0 | (U256::one() << ALLOW_MULTIPLE_FILLS_FLAG))
    }

    pub fn expiration(&self) -> u64 {
        ((self.0 >> EXPIRATION_OFFSET) & ((U256::one() << EXPIRATION_BITS) - 1)).as_u64()
    }

    pub fn is_partial_fill_allowed(&self) -> bool {
        !self.0.bit(NO_PARTIAL_FILLS_FLAG)
    }

    pub fn is_multiple_fills_allowed(&self) -> bool {
        self.0.bit(ALLOW_MULTIPLE_FILLS_FLAG)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<U256> for MakerTraits {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrder {
    pub salt: U256,
    pub maker: Address,
    pub receiver: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    pub making_amount: U256,
    pub taking_amount: U256,
    pub maker_traits: MakerTraits,
}

/// A limit order together with its hash and signature, ready to submit.
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub order: LimitOrder,
    pub order_hash: String,
    pub signature: String,
}

impl SignedOrder {
    /// Submission body in the orderbook's shape.
    pub fn payload(&self) -> Value {
        let o = &self.order;
        json!({
            "orderHash": self.order_hash,
            "signature": self.signature,
            "data": {
                "salt": o.salt.to_string(),
                "maker": format!("{:?}", o.maker),
                "receiver": format!("{:?}", o.receiver),
                "makerAsset": format!("{:?}", o.maker_asset),
                "takerAsset": format!("{:?}", o.taker_asset),
                "makingAmount": o.making_amount.to_string(),
                "takingAmount": o.taking_amount.to_string(),
                "makerTraits": o.maker_traits.as_u256().to_string(),
                "extension": "0x",
            }
        })
    }
}

impl fmt::Display for SignedOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (salt {})", self.order_hash, self.order.salt)
    }
}

fn word_u256(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

fn word_address(address: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(address.as_bytes());
    buf
}

pub fn domain_separator(chain_id: u64, verifying_contract: Address) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(32 * 5);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE));
    encoded.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&word_u256(U256::from(chain_id)));
    encoded.extend_from_slice(&word_address(verifying_contract));
    keccak256(&encoded)
}

pub fn struct_hash(order: &LimitOrder) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(32 * 9);
    encoded.extend_from_slice(&keccak256(ORDER_TYPE));
    encoded.extend_from_slice(&word_u256(order.salt));
    encoded.extend_from_slice(&word_address(order.maker));
    encoded.extend_from_slice(&word_address(order.receiver));
    encoded.extend_from_slice(&word_address(order.maker_asset));
    encoded.extend_from_slice(&word_address(order.taker_asset));
    encoded.extend_from_slice(&word_u256(order.making_amount));
    encoded.extend_from_slice(&word_u256(order.taking_amount));
    encoded.extend_from_slice(&word_u256(order.maker_traits.as_u256()));
    keccak256(&encoded)
}

/// keccak256("\x19\x01" || domainSeparator || structHash)
pub fn order_hash(order: &LimitOrder, chain_id: u64, verifying_contract: Address) -> [u8; 32] {
    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(&domain_separator(chain_id, verifying_contract));
    message.extend_from_slice(&struct_hash(order));
    keccak256(&message)
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

pub struct OrderSigner {
    wallet: LocalWallet,
    chain_id: u64,
    router: Address,
    expiration_secs: u64,
}

impl OrderSigner {
    pub fn new(wallet: LocalWallet, chain_id: u64, router: Address, expiration_secs: u64) -> Self {
        Self {
            wallet,
            chain_id,
            router,
            expiration_secs,
        }
    }

    pub fn maker(&self) -> Address {
        ethers::signers::Signer::address(&self.wallet)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Partial and multiple fills allowed, expiring `expiration_secs` after `now_unix`.
    pub fn maker_traits(&self, now_unix: u64) -> MakerTraits {
        MakerTraits::default()
            .with_expiration(now_unix + self.expiration_secs)
            .allow_partial_fills()
            .allow_multiple_fills()
    }

    pub fn build_order(&self, intent: &OrderIntent, salt: U256, now_unix: u64) -> LimitOrder {
        LimitOrder {
            salt,
            maker: self.maker(),
            receiver: self.maker(),
            maker_asset: intent.maker_asset,
            taker_asset: intent.taker_asset,
            making_amount: intent.making_amount,
            taking_amount: intent.taking_amount,
            maker_traits: self.maker_traits(now_unix),
        }
    }

    pub fn sign_order(&self, order: LimitOrder) -> Result<SignedOrder, LadderError> {
        let hash = order_hash(&order, self.chain_id, self.router);
        let signature = self
            .wallet
            .sign_hash(H256::from(hash))
            .map_err(|e| LadderError::Config(format!("failed to sign order: {e}")))?;

        Ok(SignedOrder {
            order,
            order_hash: format!("0x{}", hex::encode(hash)),
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }

    /// Build and sign an order for `intent` with a fresh random salt.
    pub fn sign(&self, intent: &OrderIntent, now_unix: u64) -> Result<SignedOrder, LadderError> {
        let salt = U256::from(rand::thread_rng().gen_range(0..SALT_BOUND));
        self.sign_order(self.build_order(intent, salt, now_unix))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
