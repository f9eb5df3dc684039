//! Tick mathematics for concentrated-liquidity positions
//!
//! Handles price <-> tick conversion, spacing alignment and the sqrt-price
//! anchor used when initializing a pool.

use ethereum_types::U256;

/// Tick bounds shared by every V3/V4-style pool
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// Base of the tick price scale
pub const TICK_BASE: f64 = 1.0001;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    #[error("price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("tick spacing must be positive, got {0}")]
    InvalidSpacing(i32),

    #[error("tick range [{lower}, {upper}] is empty after alignment to spacing {spacing}")]
    EmptyRange { lower: i32, upper: i32, spacing: i32 },
}

/// Round a tick down to the nearest multiple of `spacing`
pub fn align_lower(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Round a tick up to the nearest multiple of `spacing`
pub fn align_upper(tick: i32, spacing: i32) -> i32 {
    let floor = align_lower(tick, spacing);
    if floor == tick {
        tick
    } else {
        floor + spacing
    }
}

/// Lowest and highest ticks a position may use at this spacing
pub fn usable_tick_bounds(spacing: i32) -> (i32, i32) {
    (align_upper(MIN_TICK, spacing), align_lower(MAX_TICK, spacing))
}

pub fn is_aligned(tick: i32, spacing: i32) -> bool {
    spacing > 0 && tick.rem_euclid(spacing) == 0
}

/// Force a range onto the spacing grid: floor the lower bound, ceil the upper
/// bound, clamp to the usable tick range and keep at least one spacing width.
pub fn realign_range(tick_lower: i32, tick_upper: i32, spacing: i32) -> Result<(i32, i32), TickError> {
    if spacing <= 0 {
        return Err(TickError::InvalidSpacing(spacing));
    }
    let (min_usable, max_usable) = usable_tick_bounds(spacing);

    let mut lower = align_lower(tick_lower, spacing).max(min_usable);
    let mut upper = align_upper(tick_upper, spacing).min(max_usable);

    if upper <= lower {
        if lower + spacing <= max_usable {
            upper = lower + spacing;
        } else if upper - spacing >= min_usable {
            lower = upper - spacing;
        } else {
            return Err(TickError::EmptyRange {
                lower: tick_lower,
                upper: tick_upper,
                spacing,
            });
        }
    }

    Ok((lower, upper))
}

/// `floor(log_1.0001(price))`, clamped to the tick range. With `invert` the
/// price is taken as its reciprocal first.
pub fn price_to_tick(price: f64, invert: bool) -> Result<i32, TickError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TickError::InvalidPrice(price));
    }
    let price = if invert { 1.0 / price } else { price };
    let tick = (price.ln() / TICK_BASE.ln()).floor();
    Ok(tick.clamp(MIN_TICK as f64, MAX_TICK as f64) as i32)
}

pub fn tick_to_price(tick: i32, invert: bool) -> f64 {
    let price = TICK_BASE.powi(tick);
    if invert {
        1.0 / price
    } else {
        price
    }
}

/// Tick shift between a human price and the raw pool price for a pair whose
/// currencies have different decimals. Zero for equal decimals.
pub fn decimal_tick_offset(decimals0: u8, decimals1: u8) -> i32 {
    let diff = decimals1 as i32 - decimals0 as i32;
    if diff == 0 {
        return 0;
    }
    (diff as f64 * std::f64::consts::LN_10 / TICK_BASE.ln()).round() as i32
}

/// Convert a raw pool price (currency1 per currency0) to a Q64.96 sqrt price.
/// The integer and fractional parts of the square root are scaled separately
/// so large prices keep their low bits.
pub fn sqrt_price_x96(price: f64) -> Result<U256, TickError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TickError::InvalidPrice(price));
    }
    let root = price.sqrt();
    let whole = root.trunc();
    let frac = root - whole;

    let q96 = 2f64.powi(96);
    let whole_part = U256::from(whole as u128) << 96;
    let frac_part = U256::from((frac * q96) as u128);
    Ok(whole_part + frac_part)
}
