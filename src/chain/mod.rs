//! On-chain collaborators.
//!
//! Reads ERC-20 allowance and symbols, sends `approve`, and cancels order
//! batches on the aggregation router. Everything here is a thin wrapper
//! around `ethers`; failures become `LadderError::Chain` and are never
//! retried inside a cycle.

pub mod allowance;
pub mod signer;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::BatchCanceller;
use crate::error::LadderError;
use crate::types::{hash_bytes, CancelBatch};

/// How long to wait for a transaction receipt.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

abigen!(
    Erc20Token,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
        function symbol() external view returns (string)
    ]"#
);

abigen!(
    AggregationRouter,
    r#"[
        function cancelOrder(uint256 makerTraits, bytes32 orderHash) external
        function cancelOrders(uint256[] makerTraits, bytes32[] orderHashes) external
    ]"#
);

/// Chain reads and writes needed by the agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Address of the signing wallet.
    fn wallet_address(&self) -> Address;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, LadderError>;

    /// Send `approve(spender, amount)` and wait for the receipt.
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash, LadderError>;

    async fn symbol(&self, token: Address) -> Result<String, LadderError>;
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EvmChain {
    client: Arc<SignerClient>,
    router: Address,
}

impl EvmChain {
    pub fn new(rpc_url: &str, wallet: LocalWallet, chain_id: u64, router: Address) -> Result<Self, LadderError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LadderError::Config(format!("invalid RPC url {rpc_url}: {e}")))?;
        let wallet = wallet.with_chain_id(chain_id);
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        Ok(Self { client, router })
    }

    pub fn router(&self) -> Address {
        self.router
    }

    async fn wait_receipt(
        &self,
        operation: &str,
        pending: PendingTransaction<'_, Http>,
    ) -> Result<TxHash, LadderError> {
        let tx_hash = pending.tx_hash();
        debug!(operation, tx_hash = ?tx_hash, "Transaction sent");

        let receipt = tokio::time::timeout(RECEIPT_TIMEOUT, pending)
            .await
            .map_err(|_| LadderError::chain(operation, format!("timed out waiting for receipt of {tx_hash:?}")))?
            .map_err(|e| LadderError::chain(operation, e))?;

        match receipt {
            Some(r) if r.status == Some(U64::from(1)) => Ok(tx_hash),
            Some(_) => Err(LadderError::chain(operation, format!("transaction {tx_hash:?} reverted"))),
            None => Err(LadderError::chain(operation, format!("transaction {tx_hash:?} dropped"))),
        }
    }
}

#[async_trait]
impl ChainGateway for EvmChain {
    fn wallet_address(&self) -> Address {
        self.client.address()
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, LadderError> {
        Erc20Token::new(token, self.client.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| LadderError::chain("allowance", e))
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxHash, LadderError> {
        let erc20 = Erc20Token::new(token, self.client.clone());
        let call = erc20.approve(spender, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| LadderError::chain("approve", e))?;
        self.wait_receipt("approve", pending).await
    }

    async fn symbol(&self, token: Address) -> Result<String, LadderError> {
        Erc20Token::new(token, self.client.clone())
            .symbol()
            .call()
            .await
            .map_err(|e| LadderError::chain("symbol", e))
    }
}

#[async_trait]
impl BatchCanceller for EvmChain {
    async fn cancel_batch(&self, batch: &CancelBatch) -> Result<(), LadderError> {
        let hashes = batch
            .order_hashes
            .iter()
            .map(|h| hash_bytes(h))
            .collect::<Result<Vec<_>, _>>()?;

        let router = AggregationRouter::new(self.router, self.client.clone());
        let call = router.cancel_orders(batch.trait_bits.clone(), hashes);
        let pending = call
            .send()
            .await
            .map_err(|e| LadderError::chain("cancelOrders", e))?;
        let tx_hash = self.wait_receipt("cancelOrders", pending).await?;

        info!(count = batch.len(), tx_hash = ?tx_hash, "Cancelled order batch on-chain");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
