//! Node client seam and its `ethers` implementation with automatic failover

use crate::config::NodeConfig;
use crate::error::NodeError;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Confirmation level for account queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockLevel {
    Latest,
    Pending,
}

impl From<BlockLevel> for BlockId {
    fn from(level: BlockLevel) -> Self {
        match level {
            BlockLevel::Latest => BlockId::Number(BlockNumber::Latest),
            BlockLevel::Pending => BlockId::Number(BlockNumber::Pending),
        }
    }
}

/// Fields of an `eth_estimateGas` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: Option<U256>,
    pub data: Bytes,
}

impl EstimateRequest {
    fn to_typed(&self) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .from(self.from)
            .value(self.value)
            .data(self.data.clone());
        if let Some(to) = self.to {
            tx = tx.to(to);
        }
        if let Some(gas_price) = self.gas_price {
            tx = tx.gas_price(gas_price);
        }
        TypedTransaction::Legacy(tx)
    }
}

/// Result of looking a transaction up by hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    Absent,
    Pending,
    Included { block: u64, nonce: U256, gas_price: U256 },
}

/// One outcome of a raw transaction broadcast
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    /// Node refused the transaction
    Rejected(String),
    /// Node acknowledged the hash
    Accepted(H256),
    /// Receipt observed
    Included(TransactionReceipt),
}

/// Outcomes of one broadcast, in arrival order
pub type BroadcastEvents = mpsc::Receiver<BroadcastEvent>;

/// Everything the lifecycle needs from a blockchain node
///
/// The session behind an implementation is process-wide; records share it
/// and never close it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_chain_id(&self) -> Result<u64, NodeError>;

    async fn get_gas_price(&self) -> Result<U256, NodeError>;

    async fn get_transaction_count(
        &self,
        address: Address,
        level: BlockLevel,
    ) -> Result<u64, NodeError>;

    async fn estimate_gas(&self, request: EstimateRequest) -> Result<U256, NodeError>;

    async fn get_balance(&self, address: Address, level: BlockLevel) -> Result<U256, NodeError>;

    /// Read-only contract call
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError>;

    /// Send signed bytes; outcomes arrive on the returned channel
    async fn broadcast(&self, raw: Bytes) -> BroadcastEvents;

    async fn get_transaction(&self, hash: H256) -> Result<TxLookup, NodeError>;

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, NodeError>;
}

/// Multi-provider HTTP client with automatic failover
pub struct EthersClient {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EthersClient {
    /// Create a new client from node configuration
    pub fn new(config: &NodeConfig) -> Result<Self, NodeError> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(config.poll_interval_ms));
                    http_providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(NodeError::Rpc("No valid RPC providers".to_string()));
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("RPC failover to provider {}", next);
    }

    /// Run a query against each provider in turn until one answers
    async fn with_failover<T, F, Fut>(&self, operation: &str, query: F) -> Result<T, NodeError>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match query(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("{} failed: {}", operation, e);
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(NodeError::Rpc(format!(
            "{}: all providers failed: {}",
            operation,
            last_error.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl NodeClient for EthersClient {
    async fn get_chain_id(&self) -> Result<u64, NodeError> {
        let id = self
            .with_failover("eth_chainId", |p| async move { p.get_chainid().await })
            .await?;
        Ok(id.low_u64())
    }

    async fn get_gas_price(&self) -> Result<U256, NodeError> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        level: BlockLevel,
    ) -> Result<u64, NodeError> {
        let count = self
            .with_failover("eth_getTransactionCount", |p| async move {
                p.get_transaction_count(address, Some(level.into())).await
            })
            .await?;
        Ok(count.low_u64())
    }

    async fn estimate_gas(&self, request: EstimateRequest) -> Result<U256, NodeError> {
        // A failed estimate is an answer, not a transport fault: no failover
        self.http()
            .estimate_gas(&request.to_typed(), None)
            .await
            .map_err(|e| NodeError::Estimation(e.to_string()))
    }

    async fn get_balance(&self, address: Address, level: BlockLevel) -> Result<U256, NodeError> {
        self.with_failover("eth_getBalance", |p| async move {
            p.get_balance(address, Some(level.into())).await
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
    }

    async fn broadcast(&self, raw: Bytes) -> BroadcastEvents {
        let (events_tx, events_rx) = mpsc::channel(4);
        let provider = self.http().clone();

        tokio::spawn(async move {
            let pending = match provider.send_raw_transaction(raw).await {
                Ok(pending) => pending,
                Err(e) => {
                    let _ = events_tx.send(BroadcastEvent::Rejected(e.to_string())).await;
                    return;
                }
            };

            let hash = pending.tx_hash();
            if events_tx.send(BroadcastEvent::Accepted(hash)).await.is_err() {
                return;
            }

            match pending.await {
                Ok(Some(receipt)) => {
                    let _ = events_tx.send(BroadcastEvent::Included(receipt)).await;
                }
                Ok(None) => debug!("Transaction {:?} dropped or replaced", hash),
                Err(e) => debug!("Receipt watch for {:?} ended: {}", hash, e),
            }
        });

        events_rx
    }

    async fn get_transaction(&self, hash: H256) -> Result<TxLookup, NodeError> {
        let tx = self
            .with_failover("eth_getTransactionByHash", |p| async move {
                p.get_transaction(hash).await
            })
            .await?;

        Ok(match tx {
            None => TxLookup::Absent,
            Some(tx) => match tx.block_number {
                None => TxLookup::Pending,
                Some(block) => TxLookup::Included {
                    block: block.as_u64(),
                    nonce: tx.nonce,
                    gas_price: tx.gas_price.unwrap_or_default(),
                },
            },
        })
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, NodeError> {
        self.with_failover("eth_getTransactionReceipt", |p| async move {
            p.get_transaction_receipt(hash).await
        })
        .await
    }
}
