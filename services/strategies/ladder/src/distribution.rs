//! Ladder distributions
//!
//! The math that sizes a ladder (price bounds, notional, count, shape) lives
//! outside this crate. What crosses the boundary is an ordered list of
//! [`PositionSpec`]s; sources here only load and check that list.

use anyhow::{bail, Context, Result};
use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// One position of a ladder as produced by the distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSpec {
    pub tick_lower: i32,
    pub tick_upper: i32,
    #[serde(deserialize_with = "flexible_u256")]
    pub liquidity: U256,
    /// Expected raw amount of currency0
    #[serde(default, deserialize_with = "flexible_u256")]
    pub amount0: U256,
    /// Expected raw amount of currency1
    #[serde(default, deserialize_with = "flexible_u256")]
    pub amount1: U256,
    /// Defaults to the signer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,
}

/// Inputs handed to the distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRequest {
    pub price_lower: f64,
    pub price_upper: f64,
    pub reference_price: f64,
    pub total_notional: f64,
    pub position_count: usize,
    pub shape: String,
    pub tick_spacing: i32,
    pub invert: bool,
    pub decimals0: u8,
    pub decimals1: u8,
}

pub trait DistributionSource: Send + Sync {
    fn positions(&self, request: &DistributionRequest) -> Result<Vec<PositionSpec>>;
}

/// Accept `"123"`, `"0x7b"` or a JSON/TOML integer
fn flexible_u256<'de, D>(deserializer: D) -> std::result::Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(U256::from(n)),
        Raw::Text(text) => {
            let text = text.trim();
            let parsed = match text.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => U256::from_dec_str(text).map_err(|e| e.to_string()),
            };
            parsed.map_err(serde::de::Error::custom)
        }
    }
}

/// Distribution output contract: non-empty, each range ordered, ranges
/// ascending by lower tick
pub fn validate_positions(positions: &[PositionSpec], expected_count: Option<usize>) -> Result<()> {
    if positions.is_empty() {
        bail!("distribution produced no positions");
    }
    if let Some(count) = expected_count {
        if count != positions.len() {
            bail!("distribution produced {} positions, expected {}", positions.len(), count);
        }
    }
    for (i, spec) in positions.iter().enumerate() {
        if spec.tick_lower >= spec.tick_upper {
            bail!(
                "position {} has tick_lower {} >= tick_upper {}",
                i,
                spec.tick_lower,
                spec.tick_upper
            );
        }
        if spec.liquidity.is_zero() {
            bail!("position {} has zero liquidity", i);
        }
    }
    if positions.windows(2).any(|w| w[0].tick_lower > w[1].tick_lower) {
        bail!("positions are not ordered by tick_lower");
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ScheduleDocument {
    positions: Vec<PositionSpec>,
}

/// Positions precomputed into a JSON file: `{ "positions": [ ... ] }`
#[derive(Debug, Clone)]
pub struct ScheduleFile {
    path: PathBuf,
}

impl ScheduleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<PositionSpec>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read schedule {:?}", self.path))?;
        let document: ScheduleDocument =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse schedule {:?}", self.path))?;
        Ok(document.positions)
    }
}

impl DistributionSource for ScheduleFile {
    fn positions(&self, request: &DistributionRequest) -> Result<Vec<PositionSpec>> {
        let positions = self.load()?;
        validate_positions(&positions, Some(request.position_count))?;
        Ok(positions)
    }
}

/// In-memory list, returned as-is for every request
#[derive(Debug, Clone, Default)]
pub struct FixedDistribution {
    positions: Vec<PositionSpec>,
}

impl FixedDistribution {
    pub fn new(positions: Vec<PositionSpec>) -> Self {
        Self { positions }
    }
}

impl DistributionSource for FixedDistribution {
    fn positions(&self, _request: &DistributionRequest) -> Result<Vec<PositionSpec>> {
        validate_positions(&self.positions, None)?;
        Ok(self.positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec(lower: i32, upper: i32) -> PositionSpec {
        PositionSpec {
            tick_lower: lower,
            tick_upper: upper,
            liquidity: U256::from(1_000u64),
            amount0: U256::zero(),
            amount1: U256::zero(),
            recipient: None,
        }
    }

    #[test]
    fn test_flexible_amounts() {
        let json = r#"{"tick_lower":-120,"tick_upper":60,"liquidity":"0x3e8","amount0":"1000000000000000000000","amount1":5}"#;
        let parsed: PositionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.liquidity, U256::from(1_000u64));
        assert_eq!(parsed.amount0, U256::exp10(21));
        assert_eq!(parsed.amount1, U256::from(5u64));
        assert_eq!(parsed.recipient, None);
    }

    #[test]
    fn test_validation() {
        assert!(validate_positions(&[spec(-60, 0), spec(0, 60)], Some(2)).is_ok());
        assert!(validate_positions(&[], None).is_err());
        assert!(validate_positions(&[spec(60, 0)], None).is_err());
        assert!(validate_positions(&[spec(0, 60), spec(-60, 0)], None).is_err());
        assert!(validate_positions(&[spec(0, 60)], Some(3)).is_err());
    }

    #[test]
    fn test_schedule_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"positions":[{{"tick_lower":-120,"tick_upper":-60,"liquidity":"500","amount1":"10"}},{{"tick_lower":-60,"tick_upper":0,"liquidity":"500","amount1":"10"}}]}}"#
        )
        .unwrap();

        let source = ScheduleFile::new(file.path());
        let request = DistributionRequest {
            price_lower: 0.98,
            price_upper: 1.0,
            reference_price: 1.0,
            total_notional: 20.0,
            position_count: 2,
            shape: "linear".into(),
            tick_spacing: 60,
            invert: false,
            decimals0: 18,
            decimals1: 18,
        };
        let positions = source.positions(&request).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1].tick_upper, 0);
    }
}
