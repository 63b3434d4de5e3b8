//! Confirmation probing of broadcast hashes

use crate::chain::{NodeClient, TxLookup};
use crate::error::{NodeError, TxError, TxResult};

use ethers::types::{TransactionReceipt, H256, U256};
use serde::Serialize;
use tracing::debug;

/// A hash found in a block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mined {
    pub hash: H256,
    pub block: u64,
    pub receipt: TransactionReceipt,
    /// gas used times gas price
    pub fee_paid: U256,
}

/// Status of one hash
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeStatus {
    NotFound,
    Pending,
    Mined(Mined),
}

impl ProbeStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ProbeStatus::NotFound => "not found",
            ProbeStatus::Pending => "pending",
            ProbeStatus::Mined(_) => "mined",
        }
    }
}

/// Check a transaction by hash, no record needed
pub async fn check_hash(client: &dyn NodeClient, hash: H256) -> TxResult<ProbeStatus> {
    let probe_error = |source: NodeError| TxError::Probe {
        hash: format!("{:?}", hash),
        source,
    };

    let (block, gas_price) = match client.get_transaction(hash).await.map_err(probe_error)? {
        TxLookup::Absent => return Ok(ProbeStatus::NotFound),
        TxLookup::Pending => return Ok(ProbeStatus::Pending),
        TxLookup::Included {
            block, gas_price, ..
        } => (block, gas_price),
    };

    let receipt = match client
        .get_transaction_receipt(hash)
        .await
        .map_err(probe_error)?
    {
        Some(receipt) => receipt,
        None => {
            // node has the block but has not indexed the receipt yet
            debug!("Receipt for {:?} not available yet", hash);
            return Ok(ProbeStatus::Pending);
        }
    };

    let gas_used = receipt.gas_used.unwrap_or_default();
    let fee_paid = gas_used.saturating_mul(gas_price);

    Ok(ProbeStatus::Mined(Mined {
        hash,
        block,
        receipt,
        fee_paid,
    }))
}
