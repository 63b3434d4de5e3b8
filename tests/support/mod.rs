//! Scripted in-memory node for lifecycle tests

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use ethers::utils::rlp;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tx_booster::chain::{BlockLevel, BroadcastEvent, BroadcastEvents, EstimateRequest, TxLookup};
use tx_booster::{NodeClient, NodeError};

pub const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const TO: &str = "0x2222222222222222222222222222222222222222";

/// What the node saw in one broadcast
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub hash: H256,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub value: U256,
    pub to: Option<Address>,
    pub data: Bytes,
}

/// What the node streams back after a broadcast is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStream {
    /// Only the acknowledgement
    None,
    /// Acknowledgement, then a receipt
    AfterAccept,
    /// A receipt straight away, no acknowledgement
    Immediate,
}

struct State {
    chain_id: u64,
    gas_price: U256,
    gas_estimate: U256,
    balance: U256,
    token_balance: U256,
    latest_nonce: u64,
    pending_nonce: u64,
    rejections: VecDeque<String>,
    lookups: HashMap<H256, TxLookup>,
    receipts: HashMap<H256, TransactionReceipt>,
    broadcasts: Vec<Broadcast>,
    probes: Vec<H256>,
    broadcast_delay: Duration,
    probe_delay: Duration,
    failing_probes: usize,
    receipt_stream: ReceiptStream,
}

pub struct FakeNode {
    state: Mutex<State>,
    active_broadcasts: AtomicUsize,
    max_active_broadcasts: AtomicUsize,
}

impl Default for FakeNode {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                chain_id: 1,
                gas_price: U256::from(10),
                gas_estimate: U256::from(21_000),
                balance: U256::exp10(18),
                token_balance: U256::zero(),
                latest_nonce: 0,
                pending_nonce: 0,
                rejections: VecDeque::new(),
                lookups: HashMap::new(),
                receipts: HashMap::new(),
                broadcasts: Vec::new(),
                probes: Vec::new(),
                broadcast_delay: Duration::ZERO,
                probe_delay: Duration::ZERO,
                failing_probes: 0,
                receipt_stream: ReceiptStream::None,
            }),
            active_broadcasts: AtomicUsize::new(0),
            max_active_broadcasts: AtomicUsize::new(0),
        }
    }
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, balance: u64) {
        self.state.lock().unwrap().balance = U256::from(balance);
    }

    pub fn set_token_balance(&self, balance: u64) {
        self.state.lock().unwrap().token_balance = U256::from(balance);
    }

    /// Network price; the manager adds one on top
    pub fn set_gas_price(&self, price: u64) {
        self.state.lock().unwrap().gas_price = U256::from(price);
    }

    pub fn set_nonces(&self, latest: u64, pending: u64) {
        let mut state = self.state.lock().unwrap();
        state.latest_nonce = latest;
        state.pending_nonce = pending;
    }

    pub fn set_broadcast_delay(&self, delay: Duration) {
        self.state.lock().unwrap().broadcast_delay = delay;
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        self.state.lock().unwrap().probe_delay = delay;
    }

    /// Fail the next `count` transaction lookups with an RPC error
    pub fn fail_next_probes(&self, count: usize) {
        self.state.lock().unwrap().failing_probes = count;
    }

    /// Receipts streamed on broadcast do not change what lookups report
    pub fn set_receipt_stream(&self, mode: ReceiptStream) {
        self.state.lock().unwrap().receipt_stream = mode;
    }

    /// Refuse the next broadcast with `reason`
    pub fn reject_next(&self, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .push_back(reason.to_string());
    }

    pub fn set_pending(&self, hash: H256) {
        self.state
            .lock()
            .unwrap()
            .lookups
            .insert(hash, TxLookup::Pending);
    }

    pub fn set_absent(&self, hash: H256) {
        self.state.lock().unwrap().lookups.insert(hash, TxLookup::Absent);
    }

    /// Put `hash` in a block with a receipt
    pub fn mine(&self, hash: H256, block: u64) {
        let mut state = self.state.lock().unwrap();
        let gas_price = state
            .broadcasts
            .iter()
            .find(|b| b.hash == hash)
            .map(|b| b.gas_price)
            .unwrap_or(state.gas_price);
        let nonce = U256::from(state.latest_nonce);
        state.lookups.insert(
            hash,
            TxLookup::Included {
                block,
                nonce,
                gas_price,
            },
        );
        state.receipts.insert(hash, receipt(hash, block, gas_price));
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn probes(&self) -> Vec<H256> {
        self.state.lock().unwrap().probes.clone()
    }

    pub fn max_concurrent_broadcasts(&self) -> usize {
        self.max_active_broadcasts.load(Ordering::SeqCst)
    }

    fn decode(raw: &Bytes) -> Broadcast {
        let tx: ethers::types::Transaction = rlp::decode(raw).expect("signed legacy transaction");
        Broadcast {
            hash: tx.hash,
            nonce: tx.nonce,
            gas_price: tx.gas_price.unwrap_or_default(),
            gas_limit: tx.gas,
            value: tx.value,
            to: tx.to,
            data: tx.input,
        }
    }
}

#[async_trait]
impl NodeClient for FakeNode {
    async fn get_chain_id(&self) -> Result<u64, NodeError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn get_gas_price(&self) -> Result<U256, NodeError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn get_transaction_count(
        &self,
        _address: Address,
        level: BlockLevel,
    ) -> Result<u64, NodeError> {
        let state = self.state.lock().unwrap();
        Ok(match level {
            BlockLevel::Latest => state.latest_nonce,
            BlockLevel::Pending => state.pending_nonce,
        })
    }

    async fn estimate_gas(&self, _request: EstimateRequest) -> Result<U256, NodeError> {
        Ok(self.state.lock().unwrap().gas_estimate)
    }

    async fn get_balance(&self, _address: Address, _level: BlockLevel) -> Result<U256, NodeError> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, NodeError> {
        let balance = self.state.lock().unwrap().token_balance;
        Ok(tx_booster::tx::erc20::encode_word(balance).to_vec().into())
    }

    async fn broadcast(&self, raw: Bytes) -> BroadcastEvents {
        let active = self.active_broadcasts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_broadcasts.fetch_max(active, Ordering::SeqCst);

        let delay = self.state.lock().unwrap().broadcast_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let broadcast = Self::decode(&raw);
        let hash = broadcast.hash;
        let gas_price = broadcast.gas_price;
        let (tx, rx) = mpsc::channel(4);
        {
            let mut state = self.state.lock().unwrap();
            state.broadcasts.push(broadcast);
            match state.rejections.pop_front() {
                Some(reason) => {
                    let _ = tx.try_send(BroadcastEvent::Rejected(reason));
                }
                None => {
                    state.lookups.entry(hash).or_insert(TxLookup::Pending);
                    let included = BroadcastEvent::Included(receipt(hash, 1, gas_price));
                    match state.receipt_stream {
                        ReceiptStream::None => {
                            let _ = tx.try_send(BroadcastEvent::Accepted(hash));
                        }
                        ReceiptStream::AfterAccept => {
                            let _ = tx.try_send(BroadcastEvent::Accepted(hash));
                            let _ = tx.try_send(included);
                        }
                        ReceiptStream::Immediate => {
                            let _ = tx.try_send(included);
                        }
                    }
                }
            }
        }

        self.active_broadcasts.fetch_sub(1, Ordering::SeqCst);
        rx
    }

    async fn get_transaction(&self, hash: H256) -> Result<TxLookup, NodeError> {
        let delay = self.state.lock().unwrap().probe_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_probes > 0 {
            state.failing_probes -= 1;
            return Err(NodeError::Rpc("connection reset".to_string()));
        }
        state.probes.push(hash);
        Ok(state.lookups.get(&hash).cloned().unwrap_or(TxLookup::Absent))
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, NodeError> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }
}

fn receipt(hash: H256, block: u64, gas_price: U256) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash,
        block_number: Some(U64::from(block)),
        gas_used: Some(U256::from(21_000)),
        effective_gas_price: Some(gas_price),
        status: Some(U64::one()),
        ..Default::default()
    }
}
