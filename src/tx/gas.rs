//! Gas price and gas limit resolution, fee bumping and cost arithmetic

use crate::chain::{EstimateRequest, NodeClient};
use crate::error::{TxError, TxResult};

use ethers::types::U256;
use tracing::{debug, warn};

/// Gas estimator for transaction records
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Gas price increase per boost, in percent
    gas_price_step_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_price_step_percent: u64) -> Self {
        Self {
            gas_price_step_percent,
        }
    }

    /// Network gas price plus one unit, to stay just above the suggestion
    pub async fn suggested_gas_price(&self, client: &dyn NodeClient) -> TxResult<U256> {
        let price = client
            .get_gas_price()
            .await
            .map_err(|e| TxError::resolution("gas price", e))?;

        let price = price.saturating_add(U256::one());
        debug!("Resolved gas price: {}", price);
        Ok(price)
    }

    /// Estimate the gas limit of a fully specified call
    ///
    /// Some nodes refuse to estimate when price times gas plus value exceeds
    /// the balance, so a failed estimate is retried once without the price.
    pub async fn estimate_gas_limit(
        &self,
        client: &dyn NodeClient,
        request: EstimateRequest,
    ) -> TxResult<U256> {
        match client.estimate_gas(request.clone()).await {
            Ok(limit) => Ok(limit),
            Err(first) if request.gas_price.is_some() => {
                warn!("Gas estimate with price failed ({}), retrying without price", first);
                let request = EstimateRequest {
                    gas_price: None,
                    ..request
                };
                client
                    .estimate_gas(request)
                    .await
                    .map_err(|e| TxError::resolution("gas limit", e))
            }
            Err(e) => Err(TxError::resolution("gas limit", e)),
        }
    }

    /// Next gas price for a replacement transaction
    ///
    /// Always at least one unit higher, since an equal price is refused as an
    /// underpriced replacement.
    pub fn bump_gas_price(&self, current: U256) -> U256 {
        let step = current.saturating_mul(U256::from(self.gas_price_step_percent)) / 100;
        current.saturating_add(step.max(U256::one()))
    }

    /// Calculate total fee in base units
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> U256 {
        gas_limit.saturating_mul(gas_price)
    }

    /// Balance left to transfer once the fee is paid
    pub fn spendable(balance: U256, gas_limit: U256, gas_price: U256) -> TxResult<U256> {
        let fee = Self::calculate_cost(gas_limit, gas_price);
        balance
            .checked_sub(fee)
            .ok_or_else(|| TxError::InsufficientBalance {
                have: balance.to_string(),
                need: fee.to_string(),
            })
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(10)
    }
}
