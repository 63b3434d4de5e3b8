//! Lifecycle diagnostic events
//!
//! Every mutating operation publishes events carrying the record id, the
//! action and the resulting hash or error, so an observer can reconstruct
//! what happened to each transfer.

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAction {
    Send,
    Accepted,
    Rejected,
    Retry,
    Included,
    Boost,
    Cancel,
    Mined,
    SetGasPrice,
    TokenTransfer,
}

impl TxAction {
    /// Get action name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            TxAction::Send => "send",
            TxAction::Accepted => "accepted",
            TxAction::Rejected => "rejected",
            TxAction::Retry => "retry",
            TxAction::Included => "included",
            TxAction::Boost => "boost",
            TxAction::Cancel => "cancel",
            TxAction::Mined => "mined",
            TxAction::SetGasPrice => "set_gas_price",
            TxAction::TokenTransfer => "token_transfer",
        }
    }
}

/// One diagnostic event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEvent {
    pub tx_id: String,
    pub action: TxAction,
    pub chain_id: Option<u64>,
    pub hash: Option<H256>,
    pub error: Option<String>,
    pub nonce: Option<u64>,
    pub gas_price: Option<U256>,
    pub at: DateTime<Utc>,
}

impl TxEvent {
    pub fn new(tx_id: impl Into<String>, action: TxAction) -> Self {
        Self {
            tx_id: tx_id.into(),
            action,
            chain_id: None,
            hash: None,
            error: None,
            nonce: None,
            gas_price: None,
            at: Utc::now(),
        }
    }

    pub fn with_chain(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_hash(mut self, hash: H256) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_fee(mut self, nonce: Option<u64>, gas_price: Option<U256>) -> Self {
        self.nonce = nonce;
        self.gas_price = gas_price;
        self
    }
}

/// Publishing side of the event queue
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<TxEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: TxEvent) {
        crate::metrics::record_event(&event);
        debug!(
            tx_id = %event.tx_id,
            action = event.action.name(),
            hash = ?event.hash,
            error = ?event.error,
            "tx event"
        );
        let _ = self.tx.send(event);
    }
}
