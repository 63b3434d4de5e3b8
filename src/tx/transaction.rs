//! Transaction record and its lifecycle operations
//!
//! One `Transaction` is one logical transfer. It may be broadcast many times
//! (each fee bump yields a new hash for the same nonce); `check` reconciles
//! which of those hashes, if any, was mined.
//!
//! Mutating operations (`send`, `cancel`, `boost`, `set_gas_price`,
//! `send_erc20`) run under the record's FIFO lock for their whole duration.
//! `check` does not take the lock; concurrent checks share one probe.

use super::erc20;
use super::gas::GasEstimator;
use super::lock::SerialLock;
use super::nonce::{fetch_nonce, resolve_nonce};
use super::params::{Amount, NonceSpec, TxParams};
use super::probe::{check_hash, Mined, ProbeStatus};
use super::sender::{
    build_transaction, sign, History, RejectionRecord, SendOutcome, TransactionSender,
};
use crate::chain::{BlockLevel, ChainSpec, EstimateRequest, NodeClient};
use crate::config::BoosterConfig;
use crate::error::{StateError, TxError, TxResult};
use crate::events::{EventSink, TxAction, TxEvent};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Gas limit of a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Collaborators shared by every record of one manager
pub(crate) struct TxContext {
    pub client: Arc<dyn NodeClient>,
    pub config: BoosterConfig,
    pub gas: GasEstimator,
    pub events: EventSink,
}

impl TxContext {
    pub fn new(client: Arc<dyn NodeClient>, config: BoosterConfig) -> Self {
        Self {
            client,
            gas: GasEstimator::new(config.gas_price_step_percent),
            events: EventSink::new(config.event_capacity),
            config,
        }
    }
}

/// Mutable fields, only touched under the record's lock
#[derive(Debug, Clone)]
pub(crate) struct TxFields {
    pub to: Option<Address>,
    pub amount: Amount,
    pub data: Bytes,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    pub nonce: NonceSpec,
    pub chain_id: Option<u64>,
}

/// Read-only copy of a record's fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSnapshot {
    pub to: Option<Address>,
    pub amount: Amount,
    pub data: Bytes,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    pub nonce: NonceSpec,
    pub chain_id: Option<u64>,
}

impl From<&TxFields> for TxSnapshot {
    fn from(f: &TxFields) -> Self {
        Self {
            to: f.to,
            amount: f.amount,
            data: f.data.clone(),
            gas_price: f.gas_price,
            gas_limit: f.gas_limit,
            nonce: f.nonce,
            chain_id: f.chain_id,
        }
    }
}

/// Where a record is in its life
#[derive(Debug, Clone, PartialEq)]
pub enum TxState {
    Unsent,
    /// Broadcast at least once; `hash` is the newest variant
    Sent { hash: H256, variants: usize },
    Mined(Mined),
}

/// Result of `boost`
#[derive(Debug, Clone, PartialEq)]
pub enum BoostOutcome {
    /// Already mined, nothing sent
    Mined(Mined),
    /// Resubmitted at a higher gas price
    Boosted(SendOutcome),
    /// An earlier nonce of the account is still unconfirmed
    QueuedBehind { account_nonce: u64 },
}

/// Result of `cancel`
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// Nothing was ever broadcast
    NotSent,
    AlreadyMined(Mined),
    /// Zero-value self transfer sent with the same nonce
    Replaced(SendOutcome),
}

type SharedCheck = Shared<BoxFuture<'static, TxResult<Option<Mined>>>>;

struct BoostTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    id: String,
    sender: Address,
    wallet: LocalWallet,
    boost_interval: Duration,
    retry_on_rejection: bool,
    fields: SerialLock<TxFields>,
    chain_id: OnceLock<u64>,
    history: Arc<History>,
    mined: RwLock<Option<Mined>>,
    pending_check: Mutex<Option<SharedCheck>>,
    boost_task: Mutex<Option<BoostTask>>,
    ctx: Arc<TxContext>,
}

/// A signed transfer and all of its broadcast variants
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

fn parse_address(field: &str, value: &str) -> TxResult<Address> {
    Address::from_str(value)
        .map_err(|_| TxError::Config(format!("incorrect '{}' address: {}", field, value)))
}

fn parse_key(key: &str) -> TxResult<LocalWallet> {
    if key.len() != 66 || !key.starts_with("0x") {
        return Err(TxError::Config(
            "incorrect private key: expected 0x followed by 64 hex digits".to_string(),
        ));
    }
    key.parse::<LocalWallet>()
        .map_err(|e| TxError::Config(format!("incorrect private key: {}", e)))
}

impl Transaction {
    /// Validate parameters and create an unsent record
    pub(crate) fn new(params: TxParams, ctx: Arc<TxContext>) -> TxResult<Self> {
        let to = params
            .to
            .as_deref()
            .map(|to| parse_address("to", to))
            .transpose()?;
        let wallet = parse_key(&params.private_key)?;
        let sender = match params.sender.as_deref() {
            Some(sender) => parse_address("sender", sender)?,
            None => wallet.address(),
        };

        if params.amount.is_entire_balance() && params.nonce != NonceSpec::Latest {
            return Err(TxError::Config(
                "entire balance can only be sent with the 'latest' nonce".to_string(),
            ));
        }

        let chain_id = params
            .chain
            .clone()
            .or_else(|| ctx.config.default_chain_spec())
            .as_ref()
            .map(ChainSpec::resolve)
            .transpose()?;

        let id = params
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let gas_price = params
            .gas_price
            .or_else(|| ctx.config.start_gas_price.map(U256::from));
        let boost_interval = Duration::from_secs(
            params
                .boost_interval_secs
                .unwrap_or(ctx.config.boost_interval_secs),
        );
        let retry_on_rejection = params
            .retry_on_rejection
            .unwrap_or(ctx.config.retry_on_rejection);

        let fields = TxFields {
            to,
            amount: params.amount,
            data: params.data,
            gas_price,
            gas_limit: params.gas_limit,
            nonce: params.nonce,
            chain_id,
        };

        debug!(tx_id = %id, ?sender, ?chain_id, "Transaction created");

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                sender,
                wallet,
                boost_interval,
                retry_on_rejection,
                fields: SerialLock::new(fields),
                chain_id: chain_id.map(OnceLock::from).unwrap_or_default(),
                history: Arc::new(History::new()),
                mined: RwLock::new(None),
                pending_check: Mutex::new(None),
                boost_task: Mutex::new(None),
                ctx,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn sender(&self) -> Address {
        self.inner.sender
    }

    /// Broadcast hashes, oldest first
    pub async fn hashes(&self) -> Vec<H256> {
        self.inner.history.hashes().await
    }

    pub async fn latest_hash(&self) -> Option<H256> {
        self.inner.history.hashes().await.last().copied()
    }

    /// Broadcast rejections, oldest first
    pub async fn errors(&self) -> Vec<RejectionRecord> {
        self.inner.history.errors().await
    }

    /// True while a mutating operation holds or waits for the lock
    pub fn is_busy(&self) -> bool {
        !self.inner.fields.is_idle()
    }

    /// Copy of the current fields; waits its turn behind mutating operations
    pub async fn snapshot(&self) -> TxSnapshot {
        let fields = self.inner.fields.acquire().await;
        TxSnapshot::from(&*fields)
    }

    /// Current state as known to this record
    ///
    /// Only `check` moves a record to `Mined`. A receipt observed on the
    /// broadcast stream stops auto-boosting but leaves the state at `Sent`
    /// until the next `check`.
    pub async fn state(&self) -> TxState {
        if let Some(mined) = self.inner.mined.read().await.clone() {
            return TxState::Mined(mined);
        }
        let hashes = self.inner.history.hashes().await;
        match hashes.last() {
            None => TxState::Unsent,
            Some(hash) => TxState::Sent {
                hash: *hash,
                variants: hashes.len(),
            },
        }
    }

    fn event(&self, action: TxAction, chain_id: Option<u64>) -> TxEvent {
        TxEvent::new(self.inner.id.clone(), action).with_chain(chain_id)
    }

    /// Resolve missing fields, sign and broadcast
    pub async fn send(&self) -> TxResult<SendOutcome> {
        let outcome = {
            let mut fields = self.inner.fields.acquire().await;
            self.dispatch(&mut fields).await?
        };
        self.start_auto_boost(&outcome).await;
        Ok(outcome)
    }

    async fn start_auto_boost(&self, outcome: &SendOutcome) {
        let interval = self.inner.boost_interval;
        if matches!(outcome, SendOutcome::Accepted(_)) && !interval.is_zero() {
            self.boosting(interval).await;
        }
    }

    /// Replace the gas price used by the next broadcast
    pub async fn set_gas_price(&self, gas_price: U256) {
        let mut fields = self.inner.fields.acquire().await;
        fields.gas_price = Some(gas_price);
        info!(tx_id = %self.inner.id, %gas_price, "Gas price set");
        self.inner.ctx.events.emit(
            self.event(TxAction::SetGasPrice, fields.chain_id)
                .with_fee(fields.nonce.fixed(), Some(gas_price)),
        );
    }

    /// Turn the record into a token transfer and send it
    ///
    /// The record's recipient becomes the token contract and its value zero;
    /// the token amount travels in the call data.
    pub async fn send_erc20(&self, token: &str, to: &str, amount: Amount) -> TxResult<SendOutcome> {
        let token = parse_address("token", token)?;
        let recipient = parse_address("to", to)?;
        let ctx = &self.inner.ctx;

        let mut fields = self.inner.fields.acquire().await;

        let amount = match amount {
            Amount::Exact(value) => value,
            Amount::EntireBalance => {
                let output = ctx
                    .client
                    .call(token, erc20::balance_of_calldata(self.inner.sender))
                    .await
                    .map_err(|e| TxError::resolution("token balance", e))?;
                erc20::decode_word(&output).map_err(|e| TxError::resolution("token balance", e))?
            }
        };

        fields.to = Some(token);
        fields.data = erc20::transfer_calldata(recipient, amount);
        fields.amount = Amount::Exact(U256::zero());

        info!(
            tx_id = %self.inner.id,
            ?token,
            ?recipient,
            %amount,
            "Token transfer"
        );
        ctx.events
            .emit(self.event(TxAction::TokenTransfer, fields.chain_id));

        let outcome = self.dispatch(&mut fields).await?;
        fields.release();
        self.start_auto_boost(&outcome).await;
        Ok(outcome)
    }

    /// Everything `send` does after the lock is held
    async fn dispatch(&self, fields: &mut TxFields) -> TxResult<SendOutcome> {
        let inner = &self.inner;
        let ctx = &inner.ctx;

        let chain_id = self.resolve_fields(fields).await?;
        let tx = build_transaction(inner.sender, fields, chain_id)?;
        let signed = sign(&inner.wallet, chain_id, &tx)?;

        info!(
            tx_id = %inner.id,
            nonce = ?fields.nonce.fixed(),
            gas_price = ?fields.gas_price,
            gas_limit = ?fields.gas_limit,
            value = %fields.amount,
            hash = ?signed.hash,
            "Sending transaction"
        );
        ctx.events.emit(
            self.event(TxAction::Send, Some(chain_id))
                .with_hash(signed.hash)
                .with_fee(fields.nonce.fixed(), fields.gas_price),
        );

        let outcome = TransactionSender::new(ctx, &inner.id, chain_id, &inner.history)
            .submit(&signed, inner.retry_on_rejection)
            .await;

        Ok(outcome)
    }

    /// Fill gas price, nonce, gas limit, amount and chain id
    async fn resolve_fields(&self, fields: &mut TxFields) -> TxResult<u64> {
        let inner = &self.inner;
        let ctx = &inner.ctx;
        let client = ctx.client.as_ref();

        let gas_price = match fields.gas_price {
            Some(price) => price,
            None => ctx.gas.suggested_gas_price(client).await?,
        };
        fields.gas_price = Some(gas_price);

        if fields.nonce.fixed().is_none() {
            let nonce = resolve_nonce(client, inner.sender, fields.nonce).await?;
            fields.nonce = NonceSpec::Fixed(nonce);
        }

        let gas_limit = match fields.gas_limit {
            Some(limit) => limit,
            None => {
                let request = EstimateRequest {
                    from: inner.sender,
                    to: fields.to,
                    value: fields.amount.value_or_zero(),
                    gas_price: Some(gas_price),
                    data: fields.data.clone(),
                };
                ctx.gas.estimate_gas_limit(client, request).await?
            }
        };
        fields.gas_limit = Some(gas_limit);

        // only once price and limit are final
        if fields.amount.is_entire_balance() {
            let balance = client
                .get_balance(inner.sender, BlockLevel::Latest)
                .await
                .map_err(|e| TxError::resolution("balance", e))?;
            let value = GasEstimator::spendable(balance, gas_limit, gas_price)?;
            debug!(tx_id = %inner.id, %balance, %value, "Resolved entire balance");
            fields.amount = Amount::Exact(value);
        }

        let chain_id = match fields.chain_id {
            Some(id) => id,
            None => client
                .get_chain_id()
                .await
                .map_err(|e| TxError::resolution("chain id", e))?,
        };
        fields.chain_id = Some(chain_id);
        let _ = inner.chain_id.set(chain_id);

        Ok(chain_id)
    }

    /// Look for a mined variant among the broadcast hashes
    ///
    /// Hashes are probed newest first. The scan stops at the first pending
    /// hash, so an older variant mined while a newer one is pending is not
    /// reported until a later check. Concurrent callers share one probe.
    pub async fn check(&self) -> TxResult<Option<Mined>> {
        let shared = {
            let mut slot = self.inner.pending_check.lock().await;
            match slot.as_ref() {
                Some(shared) => shared.clone(),
                None => {
                    let tx = self.clone();
                    let fut = async move {
                        let result = tx.probe_history().await;
                        tx.inner.pending_check.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        shared.await
    }

    async fn probe_history(&self) -> TxResult<Option<Mined>> {
        let inner = &self.inner;
        let hashes = inner.history.hashes().await;
        if hashes.is_empty() {
            return Err(StateError::NoHash.into());
        }

        debug!(tx_id = %inner.id, variants = hashes.len(), "Checking transaction");

        for hash in hashes.iter().rev() {
            let status = check_hash(inner.ctx.client.as_ref(), *hash).await?;
            debug!(tx_id = %inner.id, ?hash, result = status.name(), "Probed hash");
            crate::metrics::record_check(status.name());

            match status {
                ProbeStatus::Mined(mined) => {
                    self.record_mined(&mined).await;
                    return Ok(Some(mined));
                }
                ProbeStatus::Pending => return Ok(None),
                ProbeStatus::NotFound => continue,
            }
        }

        Ok(None)
    }

    async fn record_mined(&self, mined: &Mined) {
        let mut slot = self.inner.mined.write().await;
        if slot.is_some() {
            return;
        }
        *slot = Some(mined.clone());
        drop(slot);

        let chain_id = self.inner.chain_id.get().copied();
        info!(
            tx_id = %self.inner.id,
            hash = ?mined.hash,
            block = mined.block,
            fee_paid = %mined.fee_paid,
            "Transaction mined"
        );
        crate::metrics::record_fee_paid(
            chain_id,
            mined.fee_paid.to_string().parse().unwrap_or(f64::MAX),
        );
        self.inner
            .ctx
            .events
            .emit(self.event(TxAction::Mined, chain_id).with_hash(mined.hash));
    }

    /// Replace the pending transfer with a zero-value self transfer
    pub async fn cancel(&self) -> TxResult<CancelOutcome> {
        let inner = &self.inner;
        let mut fields = inner.fields.acquire().await;

        if inner.history.hashes().await.is_empty() {
            return Ok(CancelOutcome::NotSent);
        }
        if let Some(mined) = self.check().await? {
            return Ok(CancelOutcome::AlreadyMined(mined));
        }

        let gas_price = self.current_gas_price(&fields).await?;
        fields.to = Some(inner.sender);
        fields.amount = Amount::Exact(U256::zero());
        fields.data = Bytes::default();
        fields.gas_limit = Some(U256::from(TRANSFER_GAS_LIMIT));
        fields.gas_price = Some(inner.ctx.gas.bump_gas_price(gas_price));

        info!(
            tx_id = %inner.id,
            gas_price = ?fields.gas_price,
            "Cancelling transaction"
        );
        inner.ctx.events.emit(
            self.event(TxAction::Cancel, fields.chain_id)
                .with_fee(fields.nonce.fixed(), fields.gas_price),
        );

        let outcome = self.dispatch(&mut fields).await?;
        Ok(CancelOutcome::Replaced(outcome))
    }

    /// Resubmit the same transfer with a higher gas price
    pub async fn boost(&self) -> TxResult<BoostOutcome> {
        let inner = &self.inner;
        let ctx = &inner.ctx;
        let mut fields = inner.fields.acquire().await;

        if let Some(mined) = self.check().await? {
            return Ok(BoostOutcome::Mined(mined));
        }

        let record_nonce = fields.nonce.fixed().ok_or(StateError::NoHash)?;
        let account_nonce = fetch_nonce(ctx.client.as_ref(), inner.sender, BlockLevel::Latest).await?;
        if account_nonce > record_nonce {
            return Err(StateError::NonceAdvanced {
                account: account_nonce,
                record: record_nonce,
            }
            .into());
        }
        if account_nonce < record_nonce {
            debug!(
                tx_id = %inner.id,
                account_nonce,
                record_nonce,
                "Earlier nonce still unconfirmed, not boosting"
            );
            return Ok(BoostOutcome::QueuedBehind { account_nonce });
        }

        let gas_price = ctx.gas.bump_gas_price(self.current_gas_price(&fields).await?);
        fields.gas_price = Some(gas_price);

        let gas_limit = fields.gas_limit.unwrap_or_else(|| U256::from(TRANSFER_GAS_LIMIT));
        let balance = ctx
            .client
            .get_balance(inner.sender, BlockLevel::Latest)
            .await
            .map_err(|e| TxError::resolution("balance", e))?;
        let value = fields.amount.value_or_zero();
        let total = value.saturating_add(GasEstimator::calculate_cost(gas_limit, gas_price));
        if total > balance {
            let reduced = GasEstimator::spendable(balance, gas_limit, gas_price)?;
            warn!(
                tx_id = %inner.id,
                %value,
                %reduced,
                "Balance does not cover boosted fee, transfer amount reduced"
            );
            fields.amount = Amount::Exact(reduced);
        }

        let superseded = inner.history.hashes().await.last().copied();
        info!(
            tx_id = %inner.id,
            ?superseded,
            %gas_price,
            "Boosting transaction"
        );
        ctx.events.emit(
            self.event(TxAction::Boost, fields.chain_id)
                .with_fee(Some(record_nonce), Some(gas_price)),
        );

        let outcome = self.dispatch(&mut fields).await?;
        Ok(BoostOutcome::Boosted(outcome))
    }

    async fn current_gas_price(&self, fields: &TxFields) -> TxResult<U256> {
        match fields.gas_price {
            Some(price) => Ok(price),
            None => {
                self.inner
                    .ctx
                    .gas
                    .suggested_gas_price(self.inner.ctx.client.as_ref())
                    .await
            }
        }
    }

    /// Boost every `interval` until mined or stopped
    ///
    /// Transient node failures skip a round; any other boost error, such as
    /// the nonce being consumed elsewhere, ends the task. A receipt seen on
    /// the broadcast stream ends it too.
    ///
    /// Returns false when auto-boosting is already running for this record.
    pub async fn boosting(&self, interval: Duration) -> bool {
        let mut slot = self.inner.boost_task.lock().await;
        if slot.as_ref().map_or(false, |t| !t.handle.is_finished()) {
            return false;
        }
        if self.inner.history.included().is_some() {
            return false;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let mut included_rx = self.inner.history.subscribe_included();
        let tx = self.clone();

        let handle = tokio::spawn(async move {
            let id = tx.inner.id.clone();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.changed() => break,
                    _ = included_rx.changed() => break,
                }
                if *stop_rx.borrow() {
                    break;
                }
                if tx.is_busy() {
                    debug!(tx_id = %id, "Operation in flight, deferring auto-boost");
                    continue;
                }

                match tx.boost().await {
                    Ok(BoostOutcome::Mined(_)) => break,
                    Ok(outcome) => debug!(tx_id = %id, ?outcome, "Auto-boost round done"),
                    Err(e) if e.is_retryable() => {
                        warn!(tx_id = %id, "Auto-boost round failed, retrying next tick: {}", e);
                    }
                    Err(e) => {
                        warn!(tx_id = %id, "Auto-boost stopped: {}", e);
                        break;
                    }
                }
            }
            debug!(tx_id = %id, "Auto-boost finished");
        });

        info!(tx_id = %self.inner.id, ?interval, "Auto-boost started");
        *slot = Some(BoostTask { stop, handle });
        true
    }

    pub async fn stop_boosting(&self) {
        if let Some(task) = self.inner.boost_task.lock().await.take() {
            task.stop.send_replace(true);
            debug!(tx_id = %self.inner.id, "Auto-boost stop requested");
        }
    }

    pub async fn is_boosting(&self) -> bool {
        self.inner
            .boost_task
            .lock()
            .await
            .as_ref()
            .map_or(false, |t| !t.handle.is_finished())
    }

    /// Poll `check` until a variant is mined
    ///
    /// Check failures are logged and polled through: the usual one is "no
    /// hash yet" while a send is still in flight.
    pub async fn wait(&self, interval: Duration) -> Mined {
        loop {
            tokio::time::sleep(interval).await;
            match self.check().await {
                Ok(Some(mined)) => return mined,
                Ok(None) => continue,
                Err(e) => warn!(tx_id = %self.inner.id, "Monitoring error: {}", e),
            }
        }
    }

    /// Poll until the first hash appears or a broadcast ends in rejection
    pub async fn wait_first_hash(&self, interval: Duration) -> TxResult<H256> {
        loop {
            if let Some(hash) = self.inner.history.hashes().await.first() {
                return Ok(*hash);
            }
            if let Some(rejection) = self.inner.history.errors().await.iter().find(|e| e.terminal) {
                return Err(rejection.into());
            }
            tokio::time::sleep(interval).await;
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("sender", &self.inner.sender)
            .field("signing_key", &"<redacted>")
            .field("boost_interval", &self.inner.boost_interval)
            .field("retry_on_rejection", &self.inner.retry_on_rejection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::provider::MockNodeClient;
    use crate::chain::BroadcastEvent;
    use crate::error::NodeError;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TO: &str = "0x2222222222222222222222222222222222222222";

    fn context(client: MockNodeClient) -> Arc<TxContext> {
        let config = BoosterConfig {
            retry_delay_ms: 1,
            ..BoosterConfig::default()
        };
        Arc::new(TxContext::new(Arc::new(client), config))
    }

    fn accepting(client: &mut MockNodeClient) {
        client.expect_broadcast().returning(|raw| {
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.try_send(BroadcastEvent::Accepted(crate::tx::sender::tx_hash(&raw)));
            rx
        });
    }

    #[test]
    fn test_rejects_malformed_key() {
        let ctx = context(MockNodeClient::new());
        let err = Transaction::new(TxParams::new("0x1234").to(TO), ctx.clone()).unwrap_err();
        assert!(matches!(err, TxError::Config(_)));

        let err = Transaction::new(TxParams::new(KEY).to("0xnothex"), ctx).unwrap_err();
        assert!(matches!(err, TxError::Config(_)));
    }

    #[test]
    fn test_entire_balance_requires_latest_nonce() {
        let ctx = context(MockNodeClient::new());
        let params = TxParams::new(KEY)
            .to(TO)
            .entire_balance()
            .nonce(NonceSpec::Pending);
        assert_err!(Transaction::new(params, ctx.clone()));

        let params = TxParams::new(KEY).to(TO).entire_balance();
        assert_ok!(Transaction::new(params, ctx));
    }

    #[test]
    fn test_sender_derived_from_key() {
        let ctx = context(MockNodeClient::new());
        let tx = Transaction::new(TxParams::new(KEY).to(TO), ctx).unwrap();
        let wallet: LocalWallet = KEY.parse().unwrap();
        assert_eq!(tx.sender(), wallet.address());
        assert!(!tx.id().is_empty());
        assert!(!format!("{:?}", tx).contains(&KEY[2..]));
    }

    #[tokio::test]
    async fn test_check_without_hash() {
        let ctx = context(MockNodeClient::new());
        let tx = Transaction::new(TxParams::new(KEY).to(TO), ctx).unwrap();
        let err = tx.check().await.unwrap_err();
        assert_eq!(err, TxError::State(StateError::NoHash));
        assert_eq!(tx.state().await, TxState::Unsent);
    }

    #[tokio::test]
    async fn test_cancel_before_send_is_noop() {
        let ctx = context(MockNodeClient::new());
        let tx = Transaction::new(TxParams::new(KEY).to(TO), ctx).unwrap();
        assert_eq!(tx.cancel().await.unwrap(), CancelOutcome::NotSent);
    }

    #[tokio::test]
    async fn test_send_resolves_missing_fields() {
        let mut client = MockNodeClient::new();
        client.expect_get_gas_price().returning(|| Ok(U256::from(100)));
        client
            .expect_get_transaction_count()
            .returning(|_, _| Ok(7));
        client.expect_estimate_gas().returning(|_| Ok(U256::from(21_000)));
        client.expect_get_chain_id().times(1).returning(|| Ok(5));
        accepting(&mut client);

        let tx = Transaction::new(TxParams::new(KEY).to(TO).amount(1_000u64), context(client)).unwrap();
        let outcome = tx.send().await.unwrap();

        let hash = outcome.hash().unwrap();
        assert_eq!(tx.hashes().await, vec![hash]);

        let snapshot = tx.snapshot().await;
        assert_eq!(snapshot.gas_price, Some(U256::from(101)));
        assert_eq!(snapshot.nonce, NonceSpec::Fixed(7));
        assert_eq!(snapshot.gas_limit, Some(U256::from(21_000)));
        assert_eq!(snapshot.chain_id, Some(5));
    }

    #[tokio::test]
    async fn test_send_resolution_failure_names_field() {
        let mut client = MockNodeClient::new();
        client
            .expect_get_gas_price()
            .returning(|| Err(NodeError::Rpc("connection refused".to_string())));

        let tx = Transaction::new(TxParams::new(KEY).to(TO), context(client)).unwrap();
        match tx.send().await {
            Err(TxError::Resolution { field, .. }) => assert_eq!(field, "gas price"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(tx.hashes().await.is_empty());
        assert!(!tx.is_busy());
    }

    #[tokio::test]
    async fn test_set_gas_price_used_by_next_send() {
        let mut client = MockNodeClient::new();
        client.expect_get_gas_price().never();
        client.expect_estimate_gas().returning(|_| Ok(U256::from(21_000)));
        accepting(&mut client);

        let params = TxParams::new(KEY).to(TO).nonce(3u64).chain(1u64);
        let tx = Transaction::new(params, context(client)).unwrap();
        tx.set_gas_price(U256::from(55)).await;
        assert_ok!(tx.send().await);
        assert_eq!(tx.snapshot().await.gas_price, Some(U256::from(55)));
    }

    #[tokio::test]
    async fn test_wait_first_hash_reports_terminal_rejection() {
        let mut client = MockNodeClient::new();
        client.expect_broadcast().returning(|_| {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(BroadcastEvent::Rejected("nonce too low".to_string()));
            rx
        });

        let params = TxParams::new(KEY)
            .to(TO)
            .nonce(1u64)
            .chain(1u64)
            .gas_price(10u64)
            .gas_limit(21_000u64);
        let tx = Transaction::new(params, context(client)).unwrap();
        let outcome = tx.send().await.unwrap();
        assert!(matches!(outcome, SendOutcome::Rejected(ref r) if r.permanent && r.terminal));

        let err = tx.wait_first_hash(Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, TxError::Rejection { permanent: true, .. }));
    }
}
