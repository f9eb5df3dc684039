//! Position NFT transfer events and decoding errors
//!
//! Minted position ids are recovered from `Transfer(from = 0x0, to, tokenId)`
//! logs emitted by the position manager in the confirmed receipt. The unlock
//! call returns nothing structured that carries them.

use crate::event_signatures::ERC721_TRANSFER;
use ethabi::{Event, EventParam, ParamType};
use ethereum_types::{Address, H256, U256};

/// Error types for ABI decoding
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodingError {
    #[error("ABI parsing failed: {0}")]
    AbiParsingError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Value overflow: {value} does not fit the target type")]
    ValueOverflow { value: String },

    #[error("Unexpected response shape: expected {expected} fields, got {got}")]
    UnexpectedShape { expected: usize, got: usize },

    #[error("Ambiguous encoding: {0}")]
    Ambiguous(String),

    #[error("Unknown action tag 0x{0:02x}")]
    UnknownActionTag(u8),
}

impl From<ethabi::Error> for DecodingError {
    fn from(e: ethabi::Error) -> Self {
        DecodingError::AbiParsingError(e.to_string())
    }
}

/// Minimal view of a log: emitting contract and topics
#[derive(Debug, Clone, Copy)]
pub struct TransferLog<'a> {
    pub address: Address,
    pub topics: &'a [H256],
}

impl<'a> TransferLog<'a> {
    pub fn new(address: Address, topics: &'a [H256]) -> Self {
        Self { address, topics }
    }

    /// (from, to, tokenId) for an ERC721 Transfer with all three fields indexed
    pub fn decode(&self) -> Option<(Address, Address, U256)> {
        if self.topics.len() != 4 || self.topics[0] != ERC721_TRANSFER {
            return None;
        }
        Some((
            Address::from(self.topics[1]),
            Address::from(self.topics[2]),
            U256::from_big_endian(self.topics[3].as_bytes()),
        ))
    }
}

/// ERC721 Transfer event ABI definition
/// event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)
pub fn transfer_event() -> Event {
    Event {
        name: "Transfer".to_string(),
        inputs: vec![
            EventParam {
                name: "from".to_string(),
                kind: ParamType::Address,
                indexed: true,
            },
            EventParam {
                name: "to".to_string(),
                kind: ParamType::Address,
                indexed: true,
            },
            EventParam {
                name: "tokenId".to_string(),
                kind: ParamType::Uint(256),
                indexed: true,
            },
        ],
        anonymous: false,
    }
}

/// Token ids minted by `position_manager` in a set of receipt logs, in log order
pub fn minted_token_ids<'a>(
    logs: impl IntoIterator<Item = TransferLog<'a>>,
    position_manager: Address,
) -> Vec<U256> {
    logs.into_iter()
        .filter(|log| log.address == position_manager)
        .filter_map(|log| log.decode())
        .filter(|(from, _, _)| from.is_zero())
        .map(|(_, _, id)| id)
        .collect()
}

/// Final holder per token id after replaying transfers in order; ids whose
/// last transfer went to `owner` are returned.
pub fn ids_held_by<'a>(
    logs: impl IntoIterator<Item = TransferLog<'a>>,
    position_manager: Address,
    owner: Address,
) -> Vec<U256> {
    let mut last_holder: Vec<(U256, Address)> = Vec::new();
    for (_, to, id) in logs
        .into_iter()
        .filter(|log| log.address == position_manager)
        .filter_map(|log| log.decode())
    {
        match last_holder.iter_mut().find(|(seen, _)| *seen == id) {
            Some(entry) => entry.1 = to,
            None => last_holder.push((id, to)),
        }
    }
    last_holder
        .into_iter()
        .filter(|(_, holder)| *holder == owner)
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_for(address: Address) -> H256 {
        H256::from(address)
    }

    fn topic_id(id: u64) -> H256 {
        H256::from_low_u64_be(id)
    }

    #[test]
    fn test_signature_matches_event() {
        assert_eq!(transfer_event().signature(), ERC721_TRANSFER);
    }

    #[test]
    fn test_minted_ids_only_from_zero_and_manager() {
        let manager = Address::from_low_u64_be(0x99);
        let other = Address::from_low_u64_be(0x98);
        let owner = Address::from_low_u64_be(0x42);

        let mint_a = [ERC721_TRANSFER, topic_for(Address::zero()), topic_for(owner), topic_id(7)];
        let mint_b = [ERC721_TRANSFER, topic_for(Address::zero()), topic_for(owner), topic_id(8)];
        let move_c = [ERC721_TRANSFER, topic_for(owner), topic_for(other), topic_id(9)];
        // ERC20 transfer: three topics, value in data
        let erc20 = [ERC721_TRANSFER, topic_for(Address::zero()), topic_for(owner)];

        let logs = vec![
            TransferLog::new(manager, &mint_a),
            TransferLog::new(other, &mint_b),
            TransferLog::new(manager, &move_c),
            TransferLog::new(manager, &erc20),
            TransferLog::new(manager, &mint_b),
        ];

        assert_eq!(
            minted_token_ids(logs, manager),
            vec![U256::from(7u64), U256::from(8u64)]
        );
    }

    #[test]
    fn test_ids_held_by_replays_transfers() {
        let manager = Address::from_low_u64_be(0x99);
        let owner = Address::from_low_u64_be(0x42);
        let buyer = Address::from_low_u64_be(0x43);

        let in_1 = [ERC721_TRANSFER, topic_for(Address::zero()), topic_for(owner), topic_id(1)];
        let in_2 = [ERC721_TRANSFER, topic_for(Address::zero()), topic_for(owner), topic_id(2)];
        let out_1 = [ERC721_TRANSFER, topic_for(owner), topic_for(buyer), topic_id(1)];

        let logs = vec![
            TransferLog::new(manager, &in_1),
            TransferLog::new(manager, &in_2),
            TransferLog::new(manager, &out_1),
        ];
        assert_eq!(ids_held_by(logs, manager, owner), vec![U256::from(2u64)]);
    }
}
