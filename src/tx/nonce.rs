//! Nonce resolution against on-chain account state

use super::params::NonceSpec;
use crate::chain::{BlockLevel, NodeClient};
use crate::error::{TxError, TxResult};

use ethers::types::Address;
use tracing::debug;

/// Turn a nonce spec into a concrete nonce
pub async fn resolve_nonce(
    client: &dyn NodeClient,
    sender: Address,
    spec: NonceSpec,
) -> TxResult<u64> {
    let level = match spec {
        NonceSpec::Fixed(nonce) => return Ok(nonce),
        NonceSpec::Latest => BlockLevel::Latest,
        NonceSpec::Pending => BlockLevel::Pending,
    };

    let nonce = fetch_nonce(client, sender, level).await?;
    debug!("Resolved {:?} nonce for {:?}: {}", level, sender, nonce);
    Ok(nonce)
}

/// Fetch the account's transaction count at a confirmation level
pub async fn fetch_nonce(
    client: &dyn NodeClient,
    sender: Address,
    level: BlockLevel,
) -> TxResult<u64> {
    client
        .get_transaction_count(sender, level)
        .await
        .map_err(|e| TxError::resolution("nonce", e))
}
