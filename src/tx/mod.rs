//! Transaction records: signing, broadcast, fee bumping and confirmation

pub mod erc20;
mod gas;
mod lock;
mod nonce;
mod params;
mod probe;
pub mod sender;
mod transaction;

pub use gas::GasEstimator;
pub use lock::{LockHandle, SerialLock};
pub use nonce::{fetch_nonce, resolve_nonce};
pub use params::{Amount, NonceSpec, TxParams};
pub use probe::{check_hash, Mined, ProbeStatus};
pub use sender::{RejectionRecord, SendOutcome};
pub use transaction::{
    BoostOutcome, CancelOutcome, Transaction, TxSnapshot, TxState, TRANSFER_GAS_LIMIT,
};

pub(crate) use transaction::TxContext;
