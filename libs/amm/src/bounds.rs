//! Position side classification and amount bounds
//!
//! A position entirely above the reference tick is funded only with
//! currency0, one entirely below only with currency1, and a straddling
//! position with both. The side decides what a ladder is expected to
//! consume. Mint bounds cover both currencies regardless, since the live
//! price may sit elsewhere than the reference when the mint lands.

use ethereum_types::U256;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Which currencies a position consumes relative to the reference tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    /// Range sits above the reference: currency0 only
    Above,
    /// Range sits below the reference: currency1 only
    Below,
    /// Range contains the reference: both currencies
    Straddle,
}

impl PositionSide {
    pub fn needs_currency0(self) -> bool {
        matches!(self, PositionSide::Above | PositionSide::Straddle)
    }

    pub fn needs_currency1(self) -> bool {
        matches!(self, PositionSide::Below | PositionSide::Straddle)
    }
}

pub fn classify_position(tick_lower: i32, tick_upper: i32, reference_tick: i32) -> PositionSide {
    if reference_tick < tick_lower {
        PositionSide::Above
    } else if reference_tick > tick_upper {
        PositionSide::Below
    } else {
        PositionSide::Straddle
    }
}

/// Combined multiplier: `safety * (1 + slippage_percent / 100)`
pub fn bound_multiplier(safety: Decimal, slippage_percent: Decimal) -> Decimal {
    safety * (Decimal::ONE + slippage_percent / dec!(100))
}

/// Multiply an integer amount by a decimal factor, rounding down.
/// Non-positive factors yield zero and overflow saturates.
pub fn scale_amount(amount: U256, factor: Decimal) -> U256 {
    if factor <= Decimal::ZERO || amount.is_zero() {
        return U256::zero();
    }
    let mantissa = match u128::try_from(factor.mantissa()) {
        Ok(m) => U256::from(m),
        Err(_) => return U256::zero(),
    };
    let denominator = U256::exp10(factor.scale() as usize);

    match amount.checked_mul(mantissa) {
        Some(product) => product / denominator,
        None => U256::MAX,
    }
}

/// Most of each currency a position of `liquidity` over the range can ever
/// pull: all currency0 when the price sits below the range, all currency1
/// when it sits above. Rounded up.
pub fn range_capacity(liquidity: U256, tick_lower: i32, tick_upper: i32) -> (U256, U256) {
    if liquidity.is_zero() || tick_lower >= tick_upper {
        return (U256::zero(), U256::zero());
    }
    let l = clamp_u128(liquidity) as f64;
    let sqrt_lower = 1.0001f64.powf(tick_lower as f64 / 2.0);
    let sqrt_upper = 1.0001f64.powf(tick_upper as f64 / 2.0);
    let amount0 = l * (sqrt_upper - sqrt_lower) / (sqrt_lower * sqrt_upper);
    let amount1 = l * (sqrt_upper - sqrt_lower);
    (ceil_to_u256(amount0), ceil_to_u256(amount1))
}

fn ceil_to_u256(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::zero();
    }
    // float to int casts saturate at u128::MAX
    U256::from(value.ceil() as u128)
}

/// Mint bounds for one position: the larger of the declared amount and the
/// range capacity, per currency, scaled by `multiplier`
pub fn mint_bounds(
    amount0: U256,
    amount1: U256,
    liquidity: U256,
    tick_lower: i32,
    tick_upper: i32,
    multiplier: Decimal,
) -> (u128, u128) {
    let (capacity0, capacity1) = range_capacity(liquidity, tick_lower, tick_upper);
    (
        clamp_u128(scale_amount(amount0.max(capacity0), multiplier)),
        clamp_u128(scale_amount(amount1.max(capacity1), multiplier)),
    )
}

/// Saturating narrow to the uint128 range mint bounds are encoded in
pub fn clamp_u128(amount: U256) -> u128 {
    if amount > U256::from(u128::MAX) {
        u128::MAX
    } else {
        amount.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify_position(100, 200, 50), PositionSide::Above);
        assert_eq!(classify_position(100, 200, 250), PositionSide::Below);
        assert_eq!(classify_position(100, 200, 150), PositionSide::Straddle);
        assert_eq!(classify_position(100, 200, 100), PositionSide::Straddle);
        assert_eq!(classify_position(100, 200, 200), PositionSide::Straddle);
    }

    #[test]
    fn test_side_currency_needs() {
        assert!(PositionSide::Above.needs_currency0());
        assert!(!PositionSide::Above.needs_currency1());
        assert!(PositionSide::Below.needs_currency1());
        assert!(!PositionSide::Below.needs_currency0());
        assert!(PositionSide::Straddle.needs_currency0() && PositionSide::Straddle.needs_currency1());
    }

    #[test]
    fn test_multiplier_and_scaling() {
        let m = bound_multiplier(dec!(2.0), dec!(0.5));
        assert_eq!(m, dec!(2.01));
        assert_eq!(scale_amount(U256::from(1_000u64), m), U256::from(2_010u64));
        assert_eq!(scale_amount(U256::from(999u64), dec!(0.5)), U256::from(499u64));
        assert_eq!(scale_amount(U256::from(10u64), Decimal::ZERO), U256::zero());
        assert_eq!(scale_amount(U256::MAX, dec!(2)), U256::MAX);
    }

    #[test]
    fn test_range_capacity() {
        let l = U256::from(1_000_000u64);
        let (amount0, amount1) = range_capacity(l, -60, 60);
        // symmetric around tick 0: both sides hold about L * 0.006
        assert!((5_990..=6_010).contains(&amount0.as_u64()), "{amount0}");
        assert!((5_990..=6_010).contains(&amount1.as_u64()), "{amount1}");

        let (above0, above1) = range_capacity(l, 60, 120);
        assert!(above0 < above1);
        assert_eq!(range_capacity(U256::zero(), -60, 60), (U256::zero(), U256::zero()));
        assert_eq!(range_capacity(l, 60, 60), (U256::zero(), U256::zero()));
    }

    #[test]
    fn test_mint_bounds_cover_both_currencies() {
        let m = bound_multiplier(dec!(2.0), dec!(0.5));
        // one-sided declaration: the other currency is bounded by capacity
        let (max0, max1) = mint_bounds(U256::from(1_000_000u64), U256::zero(), U256::from(1_000_000u64), 60, 120, m);
        let (_, capacity1) = range_capacity(U256::from(1_000_000u64), 60, 120);
        assert_eq!(max0, 2_010_000);
        assert_eq!(U256::from(max1), scale_amount(capacity1, m));
        assert!(max1 > 0);

        // declared amounts above capacity win
        let (max0, max1) = mint_bounds(U256::from(500u64), U256::from(500u64), U256::from(10u64), -60, 60, m);
        assert_eq!((max0, max1), (1_005, 1_005));
    }

    #[test]
    fn test_clamp_u128() {
        assert_eq!(clamp_u128(U256::from(5u8)), 5);
        assert_eq!(clamp_u128(U256::MAX), u128::MAX);
    }
}
