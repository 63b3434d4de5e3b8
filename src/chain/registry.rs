//! Chain name tables used to turn a chain name into a numeric chain id
//!
//! Two tables are consulted in order:
//! - legacy network aliases (`mainnet`, `ropsten`, ...) that map to fixed ids
//! - the named chains known to `ethers` (`polygon`, `arbitrum`, ...)

use ethers::types::Chain;
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref ALIASES: HashMap<&'static str, u64> = {
        let mut m = HashMap::new();
        m.insert("mainnet", 1);
        m.insert("main", 1);
        m.insert("homestead", 1);
        m.insert("ropsten", 3);
        m.insert("rinkeby", 4);
        m.insert("goerli", 5);
        m.insert("kovan", 42);
        m.insert("sepolia", 11155111);
        m
    };
}

/// Look up a legacy network alias
pub fn alias(name: &str) -> Option<u64> {
    ALIASES.get(name).copied()
}

/// Look up a chain by its `ethers` name
pub fn named(name: &str) -> Option<u64> {
    name.parse::<Chain>().ok().map(u64::from)
}
