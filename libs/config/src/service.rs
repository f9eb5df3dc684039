//! Service defaults
//!
//! Default values used across the ladder services. Runtime configuration in
//! [`crate::service_config`] falls back to these.

/// Nonce sequencing defaults
pub mod nonce {
    /// Re-read the pending nonce from chain after this many seconds
    pub const RESYNC_INTERVAL_SECS: u64 = 30;
}

/// Gas limits used when estimation is unavailable or as floors
pub mod gas {
    pub const APPROVE: u64 = 60_000;
    pub const PERMIT2_APPROVE: u64 = 80_000;
    pub const MINT_POSITION: u64 = 500_000;
    pub const INITIALIZE_POOL: u64 = 500_000;
    pub const MODIFY_LIQUIDITY: u64 = 400_000;

    /// Per-position allowance for batch close without an explicit limit
    pub const CLOSE_PER_POSITION: u64 = 350_000;

    /// Floor for a batch close gas limit
    pub const CLOSE_BATCH_MINIMUM: u64 = 500_000;

    /// Headroom added to approval estimates (percent)
    pub const APPROVAL_BUFFER_PERCENT: u64 = 20;

    /// Multiplier applied to the unlock-batch estimate (percent)
    pub const UNLOCK_MULTIPLIER_PERCENT: u64 = 130;
}

/// Two-hop approval defaults
pub mod approvals {
    /// Forward window for registry grants
    pub const EXPIRATION_DAYS: u64 = 365;
}

/// Ladder construction defaults
pub mod ladder {
    pub const SAFETY_MULTIPLIER: f64 = 2.0;
    pub const SLIPPAGE_PERCENT: f64 = 0.5;

    /// Warn when the pool tick and the declared reference tick differ by more
    pub const TICK_DEVIATION_WARNING: i32 = 1_000;

    /// Unlock call deadline, seconds from submission
    pub const DEADLINE_SECS: u64 = 3_600;
}

/// Receipt polling defaults
pub mod receipts {
    pub const TIMEOUT_SECS: u64 = 300;
    pub const POLL_INTERVAL_MS: u64 = 2_000;
}

/// Transfer-log scanning defaults for position enumeration
pub mod scan {
    pub const WINDOW_BLOCKS: u64 = 20_000;
    pub const CHUNK_BLOCKS: u64 = 1_000;
    pub const MINI_CHUNK_BLOCKS: u64 = 200;
}
