//! Mock orderbook and chain for integration testing.
//!
//! `MockOrderbook` is an `HttpTransport` that answers the 1inch routes the
//! agent uses (spot price, submit, lookup, cancel-batch) from in-memory
//! state. `MockChain` is a `ChainGateway` with a settable allowance.

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, TxHash, U256};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use ladderbot::api::client::{ApiRequest, ApiResponse, HttpTransport, Method};
use ladderbot::chain::ChainGateway;
use ladderbot::error::LadderError;

/// Recorded outbound call.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub at: Instant,
    pub method: Method,
    pub url: String,
}

#[derive(Debug, Default)]
struct BookState {
    prices: HashMap<String, String>,
    orders: HashMap<String, Value>,
    submitted: Vec<String>,
    lookups: Vec<String>,
    cancelled: Vec<Vec<String>>,
    dispatches: Vec<Dispatch>,
    /// Every lookup answers with this status instead of the record.
    lookup_status: Option<u16>,
    /// Every request answers with this status.
    force_status: Option<u16>,
}

/// In-memory 1inch orderbook behind the HTTP transport seam.
#[derive(Clone, Default)]
pub struct MockOrderbook {
    state: Arc<Mutex<BookState>>,
}

impl MockOrderbook {
    pub fn with_prices(prices: &[(Address, &str)]) -> Self {
        let book = Self::default();
        {
            let mut state = book.state.lock().unwrap();
            for (asset, price) in prices {
                state.prices.insert(format!("{asset:?}"), price.to_string());
            }
        }
        book
    }

    /// Make every lookup-by-hash fail with `status`.
    pub fn fail_lookups(&self, status: u16) {
        self.state.lock().unwrap().lookup_status = Some(status);
    }

    /// Make every request fail with `status`.
    pub fn fail_all(&self, status: u16) {
        self.state.lock().unwrap().force_status = Some(status);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().unwrap().lookups.clone()
    }

    pub fn cancelled(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.state.lock().unwrap().dispatches.clone()
    }

    fn respond(state: &mut BookState, request: &ApiRequest) -> ApiResponse {
        if let Some(status) = state.force_status {
            return ApiResponse { status, body: "forced".into() };
        }

        let path = request.url.split('?').next().unwrap_or_default();
        match request.method {
            Method::Get if path.contains("/price/") => ApiResponse {
                status: 200,
                body: json!(state.prices).to_string(),
            },
            Method::Get if path.contains("/order/") => {
                let hash = path.rsplit('/').next().unwrap_or_default().to_string();
                state.lookups.push(hash.clone());
                if let Some(status) = state.lookup_status {
                    return ApiResponse { status, body: "lookup failed".into() };
                }
                match state.orders.get(&hash) {
                    Some(payload) => ApiResponse {
                        status: 200,
                        body: json!({
                            "orderHash": hash,
                            "createDateTime": Utc::now().to_rfc3339(),
                            "remainingMakerAmount": payload["data"]["makingAmount"],
                            "data": payload["data"],
                        })
                        .to_string(),
                    },
                    None => ApiResponse { status: 404, body: "not found".into() },
                }
            }
            Method::Post if path.ends_with("/orders/cancel-batch") => {
                let body = request.body.clone().unwrap_or_default();
                let hashes: Vec<String> = body["orderHashes"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|h| h.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                for hash in &hashes {
                    state.orders.remove(hash);
                }
                state.cancelled.push(hashes);
                ApiResponse { status: 200, body: "{}".into() }
            }
            Method::Post if path.contains("/orderbook/") => {
                let body = request.body.clone().unwrap_or_default();
                let hash = body["orderHash"].as_str().unwrap_or_default().to_string();
                state.submitted.push(hash.clone());
                state.orders.insert(hash, body);
                ApiResponse { status: 201, body: String::new() }
            }
            _ => ApiResponse { status: 404, body: "no such route".into() },
        }
    }
}

#[async_trait]
impl HttpTransport for MockOrderbook {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, LadderError> {
        let mut state = self.state.lock().unwrap();
        state.dispatches.push(Dispatch {
            at: Instant::now(),
            method: request.method,
            url: request.url.clone(),
        });
        Ok(Self::respond(&mut state, &request))
    }
}

/// Chain gateway with an in-memory allowance.
#[derive(Clone)]
pub struct MockChain {
    wallet: Address,
    allowance: Arc<Mutex<U256>>,
    approvals: Arc<Mutex<Vec<U256>>>,
}

impl MockChain {
    pub fn new(wallet: Address, allowance: U256) -> Self {
        Self {
            wallet,
            allowance: Arc::new(Mutex::new(allowance)),
            approvals: Arc::default(),
        }
    }

    pub fn approvals(&self) -> Vec<U256> {
        self.approvals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    fn wallet_address(&self) -> Address {
        self.wallet
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256, LadderError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(&self, _token: Address, _spender: Address, amount: U256) -> Result<TxHash, LadderError> {
        *self.allowance.lock().unwrap() = amount;
        self.approvals.lock().unwrap().push(amount);
        Ok(TxHash::repeat_byte(0x42))
    }

    async fn symbol(&self, _token: Address) -> Result<String, LadderError> {
        Ok("MOCK".to_string())
    }
}
