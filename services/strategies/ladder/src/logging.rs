//! Emoji-tagged logging for the ladder state machines
//!
//! Every transition of a create or close run goes through one of the
//! `log_*!` macros below, so a long run reads as a column of markers:
//! 🔍 reads, 🔑 approvals, 🔢 nonces, ⚡ sends, ✅/❌ outcomes.

use anyhow::{anyhow, Result};
use ladder_config::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Markers prefixed to ladder log lines
pub struct LogEmoji;

impl LogEmoji {
    pub const SUCCESS: &'static str = "✅";
    pub const ERROR: &'static str = "❌";
    pub const WARNING: &'static str = "⚠️";

    /// Chain reads (pool state, positions, ownership scans)
    pub const SEARCH: &'static str = "🔍";
    /// Ladder plans and totals
    pub const CHART: &'static str = "📊";
    pub const EXECUTE: &'static str = "⚡";
    pub const POOL: &'static str = "🏊";
    pub const GAS: &'static str = "⛽";
    pub const KEY: &'static str = "🔑";
    pub const NONCE: &'static str = "🔢";
    /// Waiting on a receipt
    pub const CLOCK: &'static str = "⏱️";

    pub const MINT: &'static str = "➕";
    pub const BURN: &'static str = "➖";
}

#[doc(hidden)]
#[macro_export]
macro_rules! ladder_log {
    ($level:ident, $emoji:ident, $($arg:tt)*) => {
        tracing::$level!("{} {}", $crate::logging::LogEmoji::$emoji, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => { $crate::ladder_log!(info, SUCCESS, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::ladder_log!(error, ERROR, $($arg)*) };
}

#[macro_export]
macro_rules! log_search {
    ($($arg:tt)*) => { $crate::ladder_log!(info, SEARCH, $($arg)*) };
}

#[macro_export]
macro_rules! log_metrics {
    ($($arg:tt)*) => { $crate::ladder_log!(info, CHART, $($arg)*) };
}

#[macro_export]
macro_rules! log_execution {
    ($($arg:tt)*) => { $crate::ladder_log!(info, EXECUTE, $($arg)*) };
}

#[macro_export]
macro_rules! log_approval {
    ($($arg:tt)*) => { $crate::ladder_log!(info, KEY, $($arg)*) };
}

/// Nonce bookkeeping is chatty; kept at debug
#[macro_export]
macro_rules! log_nonce {
    ($($arg:tt)*) => { $crate::ladder_log!(debug, NONCE, $($arg)*) };
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&settings.level)?)
        .with_target(false);
    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unparseable_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("ladder=[").is_err());
        }
        assert!(env_filter("info,ladder_strategy=debug").is_ok());
    }
}
