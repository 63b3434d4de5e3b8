//! Transaction manager - owns the node session and the live records
//!
//! Records are created through the manager so they share one node client,
//! one policy and one event channel. The manager keeps every record it made,
//! indexed by id, until the caller removes it.

use crate::chain::{EthersClient, NodeClient};
use crate::config::{BoosterConfig, Settings};
use crate::error::{TxError, TxResult};
use crate::events::TxEvent;
use crate::tx::{check_hash, Amount, ProbeStatus, SendOutcome, Transaction, TxContext, TxParams};

use dashmap::DashMap;
use ethers::types::H256;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Creates and tracks transaction records
pub struct TransactionManager {
    ctx: Arc<TxContext>,
    /// Records indexed by id
    transactions: DashMap<String, Transaction>,
}

impl TransactionManager {
    pub fn new(client: Arc<dyn NodeClient>, config: BoosterConfig) -> Self {
        Self {
            ctx: Arc::new(TxContext::new(client, config)),
            transactions: DashMap::new(),
        }
    }

    /// Connect to the configured RPC endpoints
    pub fn connect(settings: &Settings) -> TxResult<Self> {
        let client = EthersClient::new(&settings.node)
            .map_err(|e| TxError::Config(format!("node connection: {}", e)))?;
        info!(
            "Connected to {} RPC endpoint(s)",
            settings.node.rpc_urls.len()
        );
        Ok(Self::new(Arc::new(client), settings.booster.clone()))
    }

    pub fn config(&self) -> &BoosterConfig {
        &self.ctx.config
    }

    pub fn client(&self) -> Arc<dyn NodeClient> {
        self.ctx.client.clone()
    }

    /// Diagnostic events of every record of this manager
    pub fn subscribe_events(&self) -> broadcast::Receiver<TxEvent> {
        self.ctx.events.subscribe()
    }

    /// Validate parameters and register an unsent record
    pub fn create(&self, params: TxParams) -> TxResult<Transaction> {
        let tx = Transaction::new(params, self.ctx.clone())?;

        match self.transactions.entry(tx.id().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(TxError::Config(format!(
                "transaction id already in use: {}",
                tx.id()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                debug!(tx_id = %tx.id(), "Transaction registered");
                Ok(tx)
            }
        }
    }

    /// Create a record and send it right away
    pub async fn send_tx(&self, params: TxParams) -> TxResult<(Transaction, SendOutcome)> {
        let tx = self.create(params)?;
        let outcome = tx.send().await?;
        Ok((tx, outcome))
    }

    /// Create a record and send it as a token transfer
    pub async fn send_erc20(
        &self,
        params: TxParams,
        token: &str,
        to: &str,
        amount: Amount,
    ) -> TxResult<(Transaction, SendOutcome)> {
        let tx = self.create(params)?;
        let outcome = tx.send_erc20(token, to, amount).await?;
        Ok((tx, outcome))
    }

    /// Probe one hash without a record
    pub async fn check_hash(&self, hash: H256) -> TxResult<ProbeStatus> {
        check_hash(self.ctx.client.as_ref(), hash).await
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.transactions.get(id).map(|tx| tx.value().clone())
    }

    /// Forget a record; its auto-boosting is stopped
    pub async fn remove(&self, id: &str) -> Option<Transaction> {
        let (_, tx) = self.transactions.remove(id)?;
        tx.stop_boosting().await;
        Some(tx)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
