//! Fee conversion and tick-spacing suggestion
//!
//! Fees are entered as percentages (0.3 = 0.3%) and stored on-chain in parts
//! per million (3000 = 0.3%). Conversion rounds to the nearest part: float
//! multiplication alone maps 3.8998% to 38997.999..., which must become 38998.

use crate::pool_key::{MAX_FEE_PARTS, MAX_TICK_SPACING};

/// Parts per million represented by one percent
pub const PARTS_PER_PERCENT: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeeError {
    #[error("fee percent {0} is not a finite number")]
    NotFinite(f64),

    #[error("fee percent {0} outside [0, 100]")]
    OutOfRange(f64),
}

/// Convert a percentage fee to parts per million, rounding to nearest
pub fn fee_percent_to_parts(percent: f64) -> u32 {
    let parts = (percent * PARTS_PER_PERCENT).round();
    if parts <= 0.0 {
        0
    } else if parts >= MAX_FEE_PARTS as f64 {
        MAX_FEE_PARTS
    } else {
        parts as u32
    }
}

pub fn parts_to_fee_percent(parts: u32) -> f64 {
    parts as f64 / PARTS_PER_PERCENT
}

/// Reject fees outside [0%, 100%] and convert the rest
pub fn validate_fee_percent(percent: f64) -> Result<u32, FeeError> {
    if !percent.is_finite() {
        return Err(FeeError::NotFinite(percent));
    }
    if !(0.0..=100.0).contains(&percent) {
        return Err(FeeError::OutOfRange(percent));
    }
    Ok(fee_percent_to_parts(percent))
}

/// `max(1, round(fee_percent * 200))`: 0.3% -> 60, 1% -> 200
pub fn suggest_tick_spacing(fee_percent: f64) -> i32 {
    if !fee_percent.is_finite() || fee_percent <= 0.0 {
        return 1;
    }
    let spacing = (fee_percent * 200.0).round();
    if spacing >= MAX_TICK_SPACING as f64 {
        MAX_TICK_SPACING
    } else {
        (spacing as i32).max(1)
    }
}
