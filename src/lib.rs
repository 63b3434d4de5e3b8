//! tx-booster - lifecycle manager for signed blockchain transactions
//!
//! A [`Transaction`] is one logical transfer that may be broadcast several
//! times: fee bumps (`boost`) and cancellations resubmit the same nonce at a
//! higher gas price, and `check` works out which variant was mined. Mutating
//! operations on one record are serialized in FIFO order.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod telemetry;
pub mod tx;

pub use chain::{ChainSpec, EthersClient, NodeClient};
pub use config::{BoosterConfig, NodeConfig, Settings};
pub use error::{NodeError, StateError, TxError, TxResult};
pub use events::{TxAction, TxEvent};
pub use manager::TransactionManager;
pub use tx::{
    Amount, BoostOutcome, CancelOutcome, Mined, NonceSpec, ProbeStatus, SendOutcome, Transaction,
    TxParams, TxState,
};
