//! Integration tests for the DEX ABI library
//!
//! Batch shape properties of the action codec and PositionInfo decoding
//! against full position manager responses.

use dex::abi::position_info::pack_standard;
use dex::abi::position_manager::{decode_pool_and_position_info, decode_modify_liquidities, encode_modify_liquidities};
use dex::*;
use ethabi::Token;
use ethereum_types::{Address, U256};
use ladder_amm::{PoolKey, PoolVariant};
use proptest::prelude::*;

fn address(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn key_for(a: u64, b: u64) -> PoolKey {
    PoolKey::new(address(a), address(b), 3000, 60, Address::zero(), PoolVariant::Standard).unwrap()
}

fn mint(key: PoolKey, index: i32) -> MintParams {
    MintParams {
        key,
        tick_lower: index * 60,
        tick_upper: (index + 1) * 60,
        liquidity: U256::from(1_000u64 + index as u64),
        amount0_max: 1_000,
        amount1_max: 0,
        owner: address(0x42),
        hook_data: Vec::new(),
    }
}

fn close(id: u64, pair: (u64, u64), burn: bool) -> ClosePosition {
    ClosePosition {
        token_id: U256::from(id),
        liquidity: U256::from(500u64),
        amount0_min: 0,
        amount1_min: 0,
        currency0: address(pair.0),
        currency1: address(pair.1),
        burn,
    }
}

proptest! {
    #[test]
    fn mint_batch_has_one_settle(k in 1usize..=20) {
        let key = key_for(0x10, 0x20);
        let mints: Vec<_> = (0..k as i32).map(|i| mint(key, i)).collect();
        let payload = batch_mint(&mints).unwrap();

        prop_assert_eq!(payload.len(), k + 1);
        prop_assert_eq!(payload.count(Action::MintPosition), k);
        prop_assert_eq!(payload.count(Action::SettlePair), 1);
        prop_assert_eq!(payload.actions().last().map(|a| a.action), Some(Action::SettlePair));
    }

    #[test]
    fn close_batch_takes_each_pair_once(
        pairs in proptest::collection::vec((0usize..3, any::<bool>()), 1..15)
    ) {
        let pool_pairs = [(0x10u64, 0x20u64), (0x30, 0x40), (0x50, 0x60)];
        let closes: Vec<_> = pairs
            .iter()
            .enumerate()
            .map(|(i, (p, burn))| close(i as u64 + 1, pool_pairs[*p], *burn))
            .collect();
        let distinct = {
            let mut seen: Vec<usize> = pairs.iter().map(|(p, _)| *p).collect();
            seen.sort_unstable();
            seen.dedup();
            seen.len()
        };
        let burns = pairs.iter().filter(|(_, b)| *b).count();

        let payload = batch_close(&closes, address(0x42)).unwrap();
        prop_assert_eq!(payload.count(Action::DecreaseLiquidity), closes.len());
        prop_assert_eq!(payload.count(Action::BurnPosition), burns);
        prop_assert_eq!(payload.count(Action::TakePair), distinct);
        prop_assert_eq!(payload.len(), closes.len() + burns + distinct);
    }
}

#[test]
fn test_close_batch_orders_takes_after_decreases() {
    // same pair given in both orders collapses to one TAKE_PAIR
    let closes = vec![close(1, (0x20, 0x10), true), close(2, (0x10, 0x20), false)];
    let payload = batch_close(&closes, address(0x42)).unwrap();
    assert_eq!(payload.tags(), vec![0x01, 0x03, 0x01, 0x11]);
}

#[test]
fn test_unlock_call_wraps_payload() {
    let key = key_for(0x10, 0x20);
    let payload = batch_mint(&[mint(key, 0), mint(key, 1)]).unwrap();
    let call = encode_modify_liquidities(payload.encode(), 1_700_000_000);

    let (inner, deadline) = decode_modify_liquidities(&call).unwrap();
    assert_eq!(deadline, U256::from(1_700_000_000u64));
    let decoded = ActionPayload::decode(&inner).unwrap();
    assert_eq!(decoded.tags(), vec![0x02, 0x02, 0x0d]);
}

#[test]
fn test_position_info_from_full_response() {
    let key = key_for(0x10, 0x20);
    let packed = pack_standard(&key.id(), -887_220, 60, 0);
    let mut response = ethabi::encode(&key.abi_fields());
    response.extend(ethabi::encode(&[Token::Uint(packed)]));

    let (decoded_key, raw) = decode_pool_and_position_info(&response, KeyLayout::Standard).unwrap();
    let ticks = decode_position_info(&raw, decoded_key.tick_spacing).unwrap();

    assert_eq!(ticks.tick_lower, -887_220);
    assert_eq!(ticks.tick_upper, 60);
    assert_eq!(ticks.confidence, DecodeConfidence::Strong);

    let info = DecodedPositionInfo::new(PoolRef::Full(decoded_key.id()), ticks, 0);
    assert!(info.pool.matches(&key.id()));
}

#[test]
fn test_minted_ids_from_receipt_logs() {
    let manager = address(0x99);
    let mint_topics = [
        ERC721_TRANSFER,
        ethereum_types::H256::from(Address::zero()),
        ethereum_types::H256::from(address(0x42)),
        ethereum_types::H256::from_low_u64_be(12345),
    ];
    let ids = minted_token_ids(vec![TransferLog::new(manager, &mint_topics)], manager);
    assert_eq!(ids, vec![U256::from(12345u64)]);
}
