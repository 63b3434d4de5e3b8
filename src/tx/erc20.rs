//! Call data for standard token transfers

use crate::error::NodeError;

use ethers::types::{Address, Bytes, U256};

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Amount as a 32-byte big-endian word
pub fn encode_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Address left-padded to 32 bytes
pub fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&encode_address(to));
    data.extend_from_slice(&encode_word(amount));
    data.into()
}

pub fn balance_of_calldata(owner: Address) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&encode_address(owner));
    data.into()
}

/// Read a `uint256` return value
pub fn decode_word(output: &[u8]) -> Result<U256, NodeError> {
    if output.len() < 32 {
        return Err(NodeError::Decode(format!(
            "expected 32-byte word, got 0x{}",
            hex::encode(output)
        )));
    }
    Ok(U256::from_big_endian(&output[..32]))
}
