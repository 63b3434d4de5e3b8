//! Construction parameters of a transaction record

use crate::chain::ChainSpec;
use crate::error::TxError;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value to transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Amount {
    /// Exact value in base units
    Exact(U256),
    /// Whole balance minus the fee, resolved at send time
    EntireBalance,
}

impl Amount {
    pub fn is_entire_balance(&self) -> bool {
        matches!(self, Amount::EntireBalance)
    }

    /// Value to use when the balance is not known yet
    pub fn value_or_zero(&self) -> U256 {
        match self {
            Amount::Exact(value) => *value,
            Amount::EntireBalance => U256::zero(),
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Exact(U256::zero())
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount::Exact(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount::Exact(U256::from(value))
    }
}

impl FromStr for Amount {
    type Err = TxError;

    /// Accepts `all`/`full`, a decimal integer or a `0x` hex integer
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("full") {
            return Ok(Amount::EntireBalance);
        }

        let parsed = match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).ok(),
            None => U256::from_dec_str(s).ok(),
        };
        parsed
            .map(Amount::Exact)
            .ok_or_else(|| TxError::Config(format!("invalid amount: {}", s)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Exact(value) => write!(f, "{}", value),
            Amount::EntireBalance => write!(f, "all"),
        }
    }
}

/// Nonce, either fixed or resolved against the account at send time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NonceSpec {
    #[default]
    Latest,
    Pending,
    Fixed(u64),
}

impl NonceSpec {
    pub fn fixed(&self) -> Option<u64> {
        match self {
            NonceSpec::Fixed(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<u64> for NonceSpec {
    fn from(n: u64) -> Self {
        NonceSpec::Fixed(n)
    }
}

impl FromStr for NonceSpec {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(NonceSpec::Latest),
            "pending" => Ok(NonceSpec::Pending),
            other => other
                .parse::<u64>()
                .map(NonceSpec::Fixed)
                .map_err(|_| TxError::Config(format!("invalid nonce: {}", s))),
        }
    }
}

/// Everything a caller supplies to create a transaction record
///
/// Addresses and the key are kept as text and validated when the record is
/// built, so a bad value surfaces as a configuration error.
#[derive(Clone, Default)]
pub struct TxParams {
    pub id: Option<String>,
    pub to: Option<String>,
    pub amount: Amount,
    pub data: Bytes,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    pub nonce: NonceSpec,
    pub private_key: String,
    /// Not checked against the key
    pub sender: Option<String>,
    pub chain: Option<ChainSpec>,
    /// Falls back to the manager default when unset
    pub boost_interval_secs: Option<u64>,
    pub retry_on_rejection: Option<bool>,
}

impl TxParams {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            ..Default::default()
        }
    }

    /// Sender address and key taken together from an account
    pub fn account(mut self, address: impl Into<String>, private_key: impl Into<String>) -> Self {
        self.sender = Some(address.into());
        self.private_key = private_key.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn to_address(mut self, to: Address) -> Self {
        self.to = Some(format!("{:?}", to));
        self
    }

    pub fn amount(mut self, amount: impl Into<Amount>) -> Self {
        self.amount = amount.into();
        self
    }

    pub fn entire_balance(mut self) -> Self {
        self.amount = Amount::EntireBalance;
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn gas_price(mut self, gas_price: impl Into<U256>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    pub fn gas_limit(mut self, gas_limit: impl Into<U256>) -> Self {
        self.gas_limit = Some(gas_limit.into());
        self
    }

    pub fn nonce(mut self, nonce: impl Into<NonceSpec>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn chain(mut self, chain: impl Into<ChainSpec>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn boost_interval_secs(mut self, secs: u64) -> Self {
        self.boost_interval_secs = Some(secs);
        self
    }

    pub fn retry_on_rejection(mut self, retry: bool) -> Self {
        self.retry_on_rejection = Some(retry);
        self
    }
}

impl fmt::Debug for TxParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxParams")
            .field("id", &self.id)
            .field("to", &self.to)
            .field("amount", &self.amount)
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("nonce", &self.nonce)
            .field("private_key", &"<redacted>")
            .field("sender", &self.sender)
            .field("chain", &self.chain)
            .finish()
    }
}
