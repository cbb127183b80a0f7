//! Spend allowance check before the first order of a cycle.

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ChainGateway;
use crate::error::LadderError;
use crate::types::format_units;

pub struct AllowanceGuard {
    chain: Arc<dyn ChainGateway>,
    token: Address,
    spender: Address,
}

impl AllowanceGuard {
    pub fn new(chain: Arc<dyn ChainGateway>, token: Address, spender: Address) -> Self {
        Self { chain, token, spender }
    }

    /// Make sure `spender` may pull at least `amount` of `token` from the
    /// wallet. Approves exactly `amount` when the current allowance is short.
    /// Returns true when an approval was sent.
    pub async fn ensure(&self, amount: U256) -> Result<bool, LadderError> {
        let owner = self.chain.wallet_address();
        let current = self.chain.allowance(self.token, owner, self.spender).await?;

        if current >= amount {
            debug!(
                allowance = %format_units(current),
                required = %format_units(amount),
                "Allowance sufficient"
            );
            return Ok(false);
        }

        info!(
            token = ?self.token,
            spender = ?self.spender,
            allowance = %format_units(current),
            required = %format_units(amount),
            "Allowance too low, approving"
        );

        match self.chain.approve(self.token, self.spender, amount).await {
            Ok(tx_hash) => {
                info!(tx_hash = ?tx_hash, amount = %format_units(amount), "Approval confirmed");
                Ok(true)
            }
            Err(e) => {
                if let LadderError::Chain { details: Some(hint), .. } = &e {
                    warn!(hint = %hint, "Approval failed");
                }
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
