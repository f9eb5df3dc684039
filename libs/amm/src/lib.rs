//! # Ladder AMM Library - Pool Identity and Tick Mathematics
//!
//! ## Purpose
//!
//! Pure, network-free mathematics for building liquidity ladders against
//! singleton pool-manager AMMs. Derives deterministic pool identifiers from
//! pool keys, converts fees between percent and parts-per-million, aligns
//! position ranges to the tick-spacing grid and computes the amount bounds a
//! mint is allowed to pull.
//!
//! ## Integration Points
//!
//! - **Input Sources**: Ladder configuration (tokens, fee, spacing, hooks) and
//!   position schedules from the distribution collaborator
//! - **Output Destinations**: Action codec (pool key tuples), orchestrator
//!   (pool ids, realigned ranges, mint bounds)
//! - **Protocol Support**: Uniswap V4 pool keys, PancakeSwap Infinity CL pool keys
//!
//! ## Architecture Role
//!
//! ```text
//! Ladder Config → [PoolKey] → [Pool Id] ──→ Orchestrator
//!                     ↓            ↓
//!              [Fee / Spacing] [Reconcile]
//!                     ↓
//! Position Schedule → [Realign] → [Side + Bounds] → Action Codec
//! ```

pub mod bounds;
pub mod fees;
pub mod pool_key;
pub mod reconcile;
pub mod ticks;

pub use bounds::{
    bound_multiplier, classify_position, mint_bounds, range_capacity, scale_amount, PositionSide,
};
pub use fees::{
    fee_percent_to_parts, parts_to_fee_percent, suggest_tick_spacing, validate_fee_percent,
    FeeError,
};
pub use pool_key::{
    compute_pool_id, sort_currencies, PoolId, PoolKey, PoolKeyError, PoolVariant,
    MAX_FEE_PARTS, MAX_TICK_SPACING,
};
pub use reconcile::{find_tick_spacing, COMMON_TICK_SPACINGS};
pub use ticks::{
    align_lower, align_upper, price_to_tick, realign_range, TickError, MAX_TICK, MIN_TICK,
};

/// Common types for amount arithmetic
pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;
