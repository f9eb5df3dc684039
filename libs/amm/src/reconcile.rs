//! Pool id reconciliation
//!
//! When a caller supplies a pool id that does not match the locally computed
//! one, the usual culprit is the tick spacing: the fee can be read from the
//! chain but the spacing cannot. This search recomputes the id over candidate
//! spacings until it reproduces the target.

use crate::pool_key::{PoolId, PoolKey, MAX_TICK_SPACING};
use tracing::debug;

/// Spacings seen on deployed pools, tried before the dense sweep
pub const COMMON_TICK_SPACINGS: [i32; 13] =
    [1, 10, 50, 60, 100, 200, 500, 780, 800, 1000, 2000, 2500, 4000];

/// Find the tick spacing that makes `template` (with `known_fee`) hash to
/// `target`. Currencies, hooks and variant come from the template; its own
/// fee and spacing are ignored. Bounded by [`MAX_TICK_SPACING`] hashes.
pub fn find_tick_spacing(known_fee: u32, target: &PoolId, template: &PoolKey) -> Option<i32> {
    let matches = |spacing: i32| template.with_params(known_fee, spacing).id() == *target;

    if let Some(spacing) = COMMON_TICK_SPACINGS.iter().copied().find(|s| matches(*s)) {
        debug!(spacing, "pool id reconciled with common tick spacing");
        return Some(spacing);
    }

    let found = (1..=MAX_TICK_SPACING)
        .filter(|s| !COMMON_TICK_SPACINGS.contains(s))
        .find(|s| matches(*s));
    if let Some(spacing) = found {
        debug!(spacing, "pool id reconciled by dense sweep");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool_key::PoolVariant;
    use ethereum_types::Address;

    fn template(variant: PoolVariant) -> PoolKey {
        PoolKey::new(
            Address::from_low_u64_be(0xaaaa),
            Address::from_low_u64_be(0xbbbb),
            3000,
            60,
            Address::zero(),
            variant,
        )
        .unwrap()
    }

    #[test]
    fn test_finds_common_spacing_with_other_fee() {
        let key = template(PoolVariant::Standard);
        let target = key.with_params(33330, 200).id();
        assert_eq!(find_tick_spacing(33330, &target, &key), Some(200));
    }

    #[test]
    fn test_finds_uncommon_spacing_via_sweep() {
        let key = template(PoolVariant::Alternate {
            pool_manager: Address::from_low_u64_be(0xcccc),
        });
        let target = key.with_params(38998, 666).id();
        assert_eq!(find_tick_spacing(38998, &target, &key), Some(666));
    }

    #[test]
    fn test_unreconcilable_target() {
        let key = template(PoolVariant::Standard);
        let target = key.with_params(500, 10).id();
        // wrong fee never reproduces the id
        assert_eq!(find_tick_spacing(3000, &target, &key), None);
    }
}
