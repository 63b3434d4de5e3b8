//! Chain module - node access and chain identifier resolution
//!
//! This module provides:
//! - The `NodeClient` seam through which every RPC call of the lifecycle goes
//! - An `ethers` HTTP implementation with multi-RPC failover
//! - Chain name / alias / id resolution

pub mod provider;
pub mod registry;

pub use provider::{
    BlockLevel, BroadcastEvent, BroadcastEvents, EstimateRequest, EthersClient, NodeClient,
    TxLookup,
};

use crate::error::{TxError, TxResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record names its chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainSpec {
    Id(u64),
    Name(String),
}

impl ChainSpec {
    /// Interpret user input: a bare integer is an id, anything else a name
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<u64>() {
            Ok(id) => ChainSpec::Id(id),
            Err(_) => ChainSpec::Name(trimmed.to_string()),
        }
    }

    /// Resolve to a numeric chain id
    ///
    /// Known aliases map to fixed ids; other names are looked up among the
    /// chains `ethers` knows. Anything else is a configuration error.
    pub fn resolve(&self) -> TxResult<u64> {
        match self {
            ChainSpec::Id(id) => Ok(*id),
            ChainSpec::Name(name) => {
                let lowered = name.to_ascii_lowercase();
                registry::alias(&lowered)
                    .or_else(|| registry::named(&lowered))
                    .ok_or_else(|| TxError::Config(format!("unknown chain: {}", name)))
            }
        }
    }
}

impl From<u64> for ChainSpec {
    fn from(id: u64) -> Self {
        ChainSpec::Id(id)
    }
}

impl From<&str> for ChainSpec {
    fn from(input: &str) -> Self {
        ChainSpec::parse(input)
    }
}

impl fmt::Display for ChainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainSpec::Id(id) => write!(f, "{}", id),
            ChainSpec::Name(name) => write!(f, "{}", name),
        }
    }
}
