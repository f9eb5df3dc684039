//! # Ladder Run Configuration
//!
//! ## Purpose
//!
//! Per-run ladder parameters (which pool, which price range, how many
//! positions) and the flags that steer one create or close run. Service-wide
//! settings such as the RPC endpoint live in `ladder_config`; a ladder file
//! only describes the ladder itself.
//!
//! ## File Formats
//!
//! TOML or JSON, picked by extension:
//!
//! ```toml
//! base_token = "0x55d398326f99059fF775485246999027B3197955"
//! quote_token = "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"
//! fee_percent = 0.05
//! price_lower = 0.995
//! price_upper = 1.005
//! reference_price = 1.0
//! position_count = 10
//! total_notional = 1000.0
//! schedule = "schedules/usdt-usdc.json"
//! ```

use crate::distribution::DistributionRequest;
use crate::errors::LadderError;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use ladder_amm::{suggest_tick_spacing, validate_fee_percent, PoolId, PoolKey, PoolVariant};
use ladder_config::ProtocolFamily;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_shape() -> String {
    "linear".to_string()
}

/// Parameters of one ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    pub base_token: Address,
    pub quote_token: Address,
    /// Pool fee in percent, e.g. `0.3`
    pub fee_percent: f64,
    /// Suggested from the fee when absent
    #[serde(default)]
    pub tick_spacing: Option<i32>,
    #[serde(default)]
    pub hooks: Address,
    /// Must match the service's protocol family when set
    #[serde(default)]
    pub protocol: Option<ProtocolFamily>,
    /// Pool id the caller expects; reconciled against the computed one
    #[serde(default)]
    pub pool_id: Option<String>,
    pub price_lower: f64,
    pub price_upper: f64,
    /// Declared price the ladder is built around
    pub reference_price: f64,
    pub position_count: usize,
    pub total_notional: f64,
    #[serde(default = "default_shape")]
    pub shape: String,
    /// Prices are quoted as currency0 per currency1
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub slippage_percent: Option<Decimal>,
    #[serde(default)]
    pub safety_multiplier: Option<Decimal>,
    /// JSON schedule with the precomputed positions
    #[serde(default)]
    pub schedule: Option<PathBuf>,
}

impl LadderConfig {
    /// Load from TOML or JSON depending on the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read ladder config {:?}", path))?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse ladder config {:?}", path))?,
            _ => toml::from_str(&content).with_context(|| format!("Failed to parse ladder config {:?}", path))?,
        };

        // Schedule paths are relative to the config file
        if let (Some(schedule), Some(dir)) = (config.schedule.as_ref(), path.parent()) {
            if schedule.is_relative() {
                config.schedule = Some(dir.join(schedule));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_token == self.quote_token {
            bail!("base_token and quote_token must differ");
        }
        for (name, price) in [
            ("price_lower", self.price_lower),
            ("price_upper", self.price_upper),
            ("reference_price", self.reference_price),
        ] {
            if !price.is_finite() || price <= 0.0 {
                bail!("{} must be a positive price, got {}", name, price);
            }
        }
        if self.price_lower >= self.price_upper {
            bail!(
                "price_lower {} must be below price_upper {}",
                self.price_lower,
                self.price_upper
            );
        }
        if self.position_count == 0 {
            bail!("position_count must be at least 1");
        }
        if !self.total_notional.is_finite() || self.total_notional <= 0.0 {
            bail!("total_notional must be positive");
        }
        if let Some(spacing) = self.tick_spacing {
            if spacing <= 0 {
                bail!("tick_spacing must be positive, got {}", spacing);
            }
        }
        if let Some(slippage) = self.slippage_percent {
            if slippage.is_sign_negative() {
                bail!("slippage_percent must not be negative");
            }
        }
        if let Some(safety) = self.safety_multiplier {
            if safety <= Decimal::ZERO {
                bail!("safety_multiplier must be positive");
            }
        }
        Ok(())
    }

    /// Fee in parts per million; rejects fees outside [0%, 100%]
    pub fn fee_parts(&self) -> Result<u32, LadderError> {
        Ok(validate_fee_percent(self.fee_percent)?)
    }

    pub fn tick_spacing(&self) -> i32 {
        self.tick_spacing.unwrap_or_else(|| suggest_tick_spacing(self.fee_percent))
    }

    pub fn pool_key(&self, variant: PoolVariant) -> Result<PoolKey, LadderError> {
        Ok(PoolKey::new(
            self.base_token,
            self.quote_token,
            self.fee_parts()?,
            self.tick_spacing(),
            self.hooks,
            variant,
        )?)
    }

    pub fn expected_pool_id(&self) -> Result<Option<PoolId>, LadderError> {
        self.pool_id
            .as_deref()
            .map(|id| {
                id.parse::<PoolId>()
                    .map_err(|e| LadderError::Configuration(format!("invalid pool_id '{id}': {e}")))
            })
            .transpose()
    }

    pub fn distribution_request(&self, decimals0: u8, decimals1: u8) -> DistributionRequest {
        DistributionRequest {
            price_lower: self.price_lower,
            price_upper: self.price_upper,
            reference_price: self.reference_price,
            total_notional: self.total_notional,
            position_count: self.position_count,
            shape: self.shape.clone(),
            tick_spacing: self.tick_spacing(),
            invert: self.invert,
            decimals0,
            decimals1,
        }
    }
}

/// Flags for one ladder creation
#[derive(Debug, Clone, Default)]
pub struct CreateFlags {
    /// Verify approvals instead of sending them
    pub skip_approvals: bool,
    pub create_pool_if_missing: bool,
    /// Stop after gas estimation; nothing is signed
    pub dry_run: bool,
    /// Falls back to the service's receipt timeout
    pub receipt_timeout: Option<Duration>,
}

/// Flags for one batch close
#[derive(Debug, Clone, Default)]
pub struct CloseFlags {
    /// Burn the position NFTs after removing liquidity
    pub burn: bool,
    pub receipt_timeout: Option<Duration>,
    /// Overrides `max(500k, n * 350k)`
    pub gas_limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const LADDER_TOML: &str = r#"
base_token = "0x55d398326f99059ff775485246999027b3197955"
quote_token = "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d"
fee_percent = 0.3
price_lower = 0.99
price_upper = 1.01
reference_price = 1.0
position_count = 4
total_notional = 1000.0
pool_id = "0x0101010101010101010101010101010101010101010101010101010101010101"
schedule = "schedule.json"
"#;

    #[test]
    fn test_load_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ladder.toml");
        fs::write(&path, LADDER_TOML).unwrap();

        let config = LadderConfig::load(&path).unwrap();
        assert_eq!(config.shape, "linear");
        assert!(!config.invert);
        assert_eq!(config.tick_spacing(), 60);
        assert_eq!(config.fee_parts().unwrap(), 3000);
        assert_eq!(config.hooks, Address::zero());
        assert_eq!(config.schedule, Some(dir.path().join("schedule.json")));
        assert_eq!(config.expected_pool_id().unwrap(), Some(PoolId([1; 32])));
    }

    #[test]
    fn test_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ladder.json");
        fs::write(
            &path,
            r#"{"base_token":"0x0000000000000000000000000000000000000002","quote_token":"0x0000000000000000000000000000000000000001",
               "fee_percent":1.0,"tick_spacing":10,"price_lower":1.0,"price_upper":2.0,"reference_price":1.5,
               "position_count":2,"total_notional":10.0,"slippage_percent":"1.5"}"#,
        )
        .unwrap();

        let config = LadderConfig::load(&path).unwrap();
        assert_eq!(config.tick_spacing(), 10);
        assert_eq!(config.slippage_percent, Some(Decimal::new(15, 1)));

        let key = config.pool_key(PoolVariant::Standard).unwrap();
        assert_eq!(key.currency0, Address::from_low_u64_be(1));
        assert_eq!(key.fee, 10_000);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ladder.toml");
        fs::write(&path, LADDER_TOML.replace("price_upper = 1.01", "price_upper = 0.5")).unwrap();
        assert!(LadderConfig::load(&path).is_err());

        fs::write(&path, LADDER_TOML.replace("position_count = 4", "position_count = 0")).unwrap();
        assert!(LadderConfig::load(&path).is_err());
    }

    #[test]
    fn test_fee_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ladder.toml");
        fs::write(&path, LADDER_TOML.replace("fee_percent = 0.3", "fee_percent = 150.0")).unwrap();
        let config = LadderConfig::load(&path).unwrap();
        assert!(matches!(config.fee_parts(), Err(LadderError::Configuration(_))));
    }
}
