//! Pool identity properties across both key variants

use ethereum_types::Address;
use ladder_amm::{compute_pool_id, suggest_tick_spacing, PoolKey, PoolVariant};
use proptest::prelude::*;

fn address_strategy() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from)
}

fn variant_strategy() -> impl Strategy<Value = PoolVariant> {
    prop_oneof![
        Just(PoolVariant::Standard),
        address_strategy().prop_map(|pool_manager| PoolVariant::Alternate { pool_manager }),
    ]
}

proptest! {
    #[test]
    fn prop_identity_symmetric_under_currency_swap(
        a in address_strategy(),
        b in address_strategy(),
        fee in 0u32..=1_000_000,
        spacing in 1i32..=32_767,
        hooks in address_strategy(),
        variant in variant_strategy(),
    ) {
        prop_assume!(a != b);
        let forward = compute_pool_id(a, b, fee, spacing, hooks, variant).unwrap();
        let backward = compute_pool_id(b, a, fee, spacing, hooks, variant).unwrap();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_spacing_changes_identity(
        a in address_strategy(),
        b in address_strategy(),
        spacing in 1i32..32_767,
    ) {
        prop_assume!(a != b);
        let one = compute_pool_id(a, b, 3000, spacing, Address::zero(), PoolVariant::Standard).unwrap();
        let other = compute_pool_id(a, b, 3000, spacing + 1, Address::zero(), PoolVariant::Standard).unwrap();
        prop_assert_ne!(one, other);
    }
}

#[test]
fn test_suggested_spacing_builds_valid_key() {
    let usdt: Address = "0x55d398326f99059fF775485246999027B3197955".parse().unwrap();
    let wbnb: Address = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c".parse().unwrap();

    let spacing = suggest_tick_spacing(0.3);
    let key = PoolKey::new(wbnb, usdt, 3000, spacing, Address::zero(), PoolVariant::Standard).unwrap();

    assert_eq!(key.currency0, usdt);
    assert_eq!(key.currency1, wbnb);
    assert_eq!(key.tick_spacing, 60);
    assert_eq!(key.id(), compute_pool_id(usdt, wbnb, 3000, 60, Address::zero(), PoolVariant::Standard).unwrap());
}
