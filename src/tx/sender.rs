//! Transaction sender: signing, hashing and broadcast with rejection retry

use super::params::Amount;
use super::transaction::{TxContext, TxFields};
use crate::chain::{BroadcastEvent, BroadcastEvents};
use crate::error::{is_permanent_rejection, TxError, TxResult};
use crate::events::{TxAction, TxEvent};

use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256};
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// A broadcast the node refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionRecord {
    pub reason: String,
    /// Reason is one that resending cannot cure
    pub permanent: bool,
    /// The attempt ended here (no retry followed)
    pub terminal: bool,
    /// Precomputed hash of the refused payload
    pub hash: H256,
    pub at: DateTime<Utc>,
}

impl From<&RejectionRecord> for TxError {
    fn from(record: &RejectionRecord) -> Self {
        TxError::Rejection {
            reason: record.reason.clone(),
            permanent: record.permanent,
        }
    }
}

/// How one submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Hash acknowledged by the node
    Accepted(H256),
    /// Receipt observed before the acknowledgement was consumed
    Included(H256),
    Rejected(RejectionRecord),
}

impl SendOutcome {
    pub fn hash(&self) -> Option<H256> {
        match self {
            SendOutcome::Accepted(hash) | SendOutcome::Included(hash) => Some(*hash),
            SendOutcome::Rejected(_) => None,
        }
    }
}

/// Hash and error history of one record
pub(crate) struct History {
    hashes: RwLock<Vec<H256>>,
    errors: RwLock<Vec<RejectionRecord>>,
    included: watch::Sender<Option<H256>>,
}

impl History {
    pub fn new() -> Self {
        let (included, _) = watch::channel(None);
        Self {
            hashes: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            included,
        }
    }

    pub async fn hashes(&self) -> Vec<H256> {
        self.hashes.read().await.clone()
    }

    pub async fn errors(&self) -> Vec<RejectionRecord> {
        self.errors.read().await.clone()
    }

    /// Append a hash unless it is already known; existing entries never move
    pub async fn push_hash(&self, hash: H256) -> bool {
        let mut hashes = self.hashes.write().await;
        if hashes.contains(&hash) {
            return false;
        }
        hashes.push(hash);
        true
    }

    pub async fn push_error(&self, record: RejectionRecord) {
        self.errors.write().await.push(record);
    }

    /// Record an observed receipt; wakes whatever waits on inclusion
    pub async fn record_included(&self, hash: H256) {
        self.push_hash(hash).await;
        self.included.send_replace(Some(hash));
    }

    pub fn included(&self) -> Option<H256> {
        *self.included.borrow()
    }

    pub fn subscribe_included(&self) -> watch::Receiver<Option<H256>> {
        self.included.subscribe()
    }
}

/// Signed wire bytes and their hash
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub raw: Bytes,
    pub hash: H256,
}

/// Keccak-256 of the serialized transaction, known before broadcast
pub fn tx_hash(raw: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(raw))
}

/// Build the unsigned legacy transaction from resolved fields
pub(crate) fn build_transaction(
    sender: Address,
    fields: &TxFields,
    chain_id: u64,
) -> TxResult<TypedTransaction> {
    let nonce = fields
        .nonce
        .fixed()
        .ok_or_else(|| TxError::Config("nonce not resolved".to_string()))?;
    let gas_price = fields
        .gas_price
        .ok_or_else(|| TxError::Config("gas price not resolved".to_string()))?;
    let gas_limit = fields
        .gas_limit
        .ok_or_else(|| TxError::Config("gas limit not resolved".to_string()))?;
    let value = match fields.amount {
        Amount::Exact(value) => value,
        Amount::EntireBalance => {
            return Err(TxError::Config("amount not resolved".to_string()));
        }
    };

    let mut tx = TransactionRequest::new()
        .from(sender)
        .nonce(nonce)
        .value(value)
        .data(fields.data.clone())
        .gas(gas_limit)
        .gas_price(gas_price)
        .chain_id(chain_id);
    if let Some(to) = fields.to {
        tx = tx.to(to);
    }

    Ok(TypedTransaction::Legacy(tx))
}

/// Sign with the holder's key and serialize to wire bytes
pub(crate) fn sign(wallet: &LocalWallet, chain_id: u64, tx: &TypedTransaction) -> TxResult<SignedTx> {
    let wallet = wallet.clone().with_chain_id(chain_id);
    let signature = wallet
        .sign_transaction_sync(tx)
        .map_err(|e| TxError::Signing(e.to_string()))?;
    let raw = tx.rlp_signed(&signature);
    let hash = tx_hash(&raw);

    Ok(SignedTx { raw, hash })
}

/// Broadcasts one signed payload and interprets the outcome
pub(crate) struct TransactionSender<'a> {
    ctx: &'a TxContext,
    tx_id: &'a str,
    chain_id: u64,
    history: &'a Arc<History>,
}

impl<'a> TransactionSender<'a> {
    pub fn new(
        ctx: &'a TxContext,
        tx_id: &'a str,
        chain_id: u64,
        history: &'a Arc<History>,
    ) -> Self {
        Self {
            ctx,
            tx_id,
            chain_id,
            history,
        }
    }

    fn event(&self, action: TxAction) -> TxEvent {
        TxEvent::new(self.tx_id, action).with_chain(Some(self.chain_id))
    }

    /// Broadcast, retrying transient rejections with the same payload
    ///
    /// Runs entirely under the caller's lock; only a final outcome returns.
    pub async fn submit(&self, signed: &SignedTx, retry_on_rejection: bool) -> SendOutcome {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let mut events = self.ctx.client.broadcast(signed.raw.clone()).await;

            let reason = match events.recv().await {
                Some(BroadcastEvent::Accepted(hash)) => {
                    if hash != signed.hash {
                        warn!(
                            tx_id = %self.tx_id,
                            "Node hash {:?} differs from local hash {:?}", hash, signed.hash
                        );
                    }
                    self.history.push_hash(hash).await;
                    info!(tx_id = %self.tx_id, ?hash, attempts, "Transaction sent");
                    self.ctx.events.emit(self.event(TxAction::Accepted).with_hash(hash));
                    self.watch_inclusion(events);
                    return SendOutcome::Accepted(hash);
                }
                Some(BroadcastEvent::Included(receipt)) => {
                    let hash = receipt.transaction_hash;
                    self.history.record_included(hash).await;
                    info!(tx_id = %self.tx_id, ?hash, "Transaction included");
                    self.ctx.events.emit(self.event(TxAction::Included).with_hash(hash));
                    return SendOutcome::Included(hash);
                }
                Some(BroadcastEvent::Rejected(reason)) => reason,
                None => "broadcast ended without an outcome".to_string(),
            };

            let permanent = is_permanent_rejection(&reason);
            let retry = retry_on_rejection && !permanent;
            let record = RejectionRecord {
                reason,
                permanent,
                terminal: !retry,
                hash: signed.hash,
                at: Utc::now(),
            };
            self.history.push_error(record.clone()).await;
            warn!(
                tx_id = %self.tx_id,
                reason = %record.reason,
                permanent,
                attempts,
                "Transaction rejected"
            );
            self.ctx
                .events
                .emit(self.event(TxAction::Rejected).with_error(&record.reason));

            if retry {
                self.ctx.events.emit(self.event(TxAction::Retry).with_hash(signed.hash));
                tokio::time::sleep(self.ctx.config.retry_delay()).await;
                continue;
            }

            if self.ctx.config.record_hash_on_rejection {
                // it may still land despite the local refusal
                self.history.push_hash(signed.hash).await;
            }
            return SendOutcome::Rejected(record);
        }
    }

    /// Keep reading the broadcast stream after the lock is gone, for the receipt
    fn watch_inclusion(&self, mut events: BroadcastEvents) {
        let history = self.history.clone();
        let sink = self.ctx.events.clone();
        let event = self.event(TxAction::Included);

        tokio::spawn(async move {
            while let Some(outcome) = events.recv().await {
                if let BroadcastEvent::Included(receipt) = outcome {
                    let hash = receipt.transaction_hash;
                    history.record_included(hash).await;
                    debug!(tx_id = %event.tx_id, ?hash, "Receipt observed");
                    sink.emit(event.with_hash(hash));
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::params::NonceSpec;
    use ethers::types::U256;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn fields() -> TxFields {
        TxFields {
            to: Some(Address::repeat_byte(0x22)),
            amount: Amount::Exact(U256::from(1_000)),
            data: Bytes::default(),
            gas_price: Some(U256::from(10)),
            gas_limit: Some(U256::from(21_000)),
            nonce: NonceSpec::Fixed(4),
            chain_id: Some(1),
        }
    }

    #[test]
    fn test_hash_is_keccak_of_raw_bytes() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let tx = build_transaction(wallet.address(), &fields(), 1).unwrap();
        let signed = sign(&wallet, 1, &tx).unwrap();

        assert_eq!(signed.hash, H256::from(ethers::utils::keccak256(&signed.raw)));
        // deterministic: same fields, same key, same bytes
        let again = sign(&wallet, 1, &tx).unwrap();
        assert_eq!(signed.raw, again.raw);
    }

    #[test]
    fn test_chain_id_changes_hash() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let mainnet = sign(&wallet, 1, &build_transaction(wallet.address(), &fields(), 1).unwrap());
        let ropsten = sign(&wallet, 3, &build_transaction(wallet.address(), &fields(), 3).unwrap());
        assert_ne!(mainnet.unwrap().hash, ropsten.unwrap().hash);
    }

    #[test]
    fn test_unresolved_fields_refused() {
        let mut unresolved = fields();
        unresolved.nonce = NonceSpec::Pending;
        assert!(build_transaction(Address::zero(), &unresolved, 1).is_err());

        let mut unresolved = fields();
        unresolved.amount = Amount::EntireBalance;
        assert!(build_transaction(Address::zero(), &unresolved, 1).is_err());
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let history = History::new();
        assert!(history.push_hash(H256::repeat_byte(1)).await);
        assert!(history.push_hash(H256::repeat_byte(2)).await);
        assert!(!history.push_hash(H256::repeat_byte(1)).await);

        history.record_included(H256::repeat_byte(3)).await;
        assert_eq!(
            history.hashes().await,
            vec![H256::repeat_byte(1), H256::repeat_byte(2), H256::repeat_byte(3)]
        );
        assert_eq!(history.included(), Some(H256::repeat_byte(3)));
    }
}
