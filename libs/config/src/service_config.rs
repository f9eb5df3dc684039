//! Service Configuration Module
//!
//! Provides configuration loading for the ladder service. Values come from an
//! optional TOML file overlaid with `LADDER__SECTION__KEY` environment
//! variables; anything left unset falls back to [`crate::service`] defaults.
//!
//! The signing key is never part of this configuration.

use crate::protocol::{self, ProtocolFamily};
use crate::service;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix for overrides, e.g. `LADDER__NETWORK__RPC_URL`
pub const ENV_PREFIX: &str = "LADDER";

/// Main service configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LadderServiceConfig {
    pub network: NetworkSettings,
    pub execution: ExecutionSettings,
    pub approvals: ApprovalSettings,
    pub ladder: LadderDefaults,
    pub indexer: IndexerSettings,
    pub logging: LoggingSettings,
}

/// Chain endpoint and optional contract address overrides
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    pub protocol: ProtocolFamily,
    pub pool_manager: Option<String>,
    pub position_manager: Option<String>,
    pub state_view: Option<String>,
    pub permit2: Option<String>,
    pub multicall: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// How long to wait for a receipt before reporting a timeout
    pub tx_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub nonce_resync_secs: u64,
    pub deadline_secs: u64,
    pub unlock_gas_multiplier_percent: u64,
    pub approval_gas_buffer_percent: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub expiration_days: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LadderDefaults {
    pub safety_multiplier: f64,
    pub slippage_percent: f64,
    pub tick_deviation_warning: i32,
}

/// Position enumeration: explorer API first, log scanning as fallback
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub enabled: bool,
    pub explorer_api_url: Option<String>,
    pub api_key: Option<String>,
    pub scan_window_blocks: u64,
    pub chunk_blocks: u64,
    pub mini_chunk_blocks: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

/// Contract addresses after applying overrides to the known deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddresses {
    pub pool_manager: String,
    pub position_manager: String,
    pub state_view: Option<String>,
    pub permit2: String,
    pub multicall: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            chain_id: protocol::chains::BSC,
            rpc_url: "https://bsc-dataseed.binance.org".to_string(),
            protocol: ProtocolFamily::Uniswap,
            pool_manager: None,
            position_manager: None,
            state_view: None,
            permit2: None,
            multicall: None,
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            tx_timeout_secs: service::receipts::TIMEOUT_SECS,
            poll_interval_ms: service::receipts::POLL_INTERVAL_MS,
            nonce_resync_secs: service::nonce::RESYNC_INTERVAL_SECS,
            deadline_secs: service::ladder::DEADLINE_SECS,
            unlock_gas_multiplier_percent: service::gas::UNLOCK_MULTIPLIER_PERCENT,
            approval_gas_buffer_percent: service::gas::APPROVAL_BUFFER_PERCENT,
        }
    }
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            expiration_days: service::approvals::EXPIRATION_DAYS,
        }
    }
}

impl Default for LadderDefaults {
    fn default() -> Self {
        Self {
            safety_multiplier: service::ladder::SAFETY_MULTIPLIER,
            slippage_percent: service::ladder::SLIPPAGE_PERCENT,
            tick_deviation_warning: service::ladder::TICK_DEVIATION_WARNING,
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            explorer_api_url: None,
            api_key: None,
            scan_window_blocks: service::scan::WINDOW_BLOCKS,
            chunk_blocks: service::scan::CHUNK_BLOCKS,
            mini_chunk_blocks: service::scan::MINI_CHUNK_BLOCKS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LadderServiceConfig {
    /// Load configuration from an optional TOML file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading ladder config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        } else {
            debug!("No config file given, using defaults and environment");
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR}` references in URL-like values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::env(&self.network.rpc_url).context("Failed to expand RPC URL")?;
        self.network.rpc_url = expanded.to_string();

        if let Some(url) = &self.indexer.explorer_api_url {
            let expanded = shellexpand::env(url).context("Failed to expand explorer URL")?;
            self.indexer.explorer_api_url = Some(expanded.to_string());
        }
        if let Some(key) = &self.indexer.api_key {
            let expanded = shellexpand::env(key).context("Failed to expand explorer API key")?;
            self.indexer.api_key = Some(expanded.to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.trim().is_empty() {
            bail!("network.rpc_url must not be empty");
        }
        if self.execution.tx_timeout_secs == 0 {
            bail!("execution.tx_timeout_secs must be positive");
        }
        if self.execution.poll_interval_ms == 0 {
            bail!("execution.poll_interval_ms must be positive");
        }
        if self.execution.unlock_gas_multiplier_percent < 100 {
            bail!("execution.unlock_gas_multiplier_percent must be at least 100");
        }
        if self.approvals.expiration_days == 0 {
            bail!("approvals.expiration_days must be positive");
        }
        if self.ladder.safety_multiplier < 1.0 {
            bail!("ladder.safety_multiplier must be at least 1.0");
        }
        if !(0.0..=50.0).contains(&self.ladder.slippage_percent) {
            bail!("ladder.slippage_percent must be within [0, 50]");
        }
        if self.indexer.chunk_blocks == 0 || self.indexer.mini_chunk_blocks == 0 {
            bail!("indexer chunk sizes must be positive");
        }
        if self.indexer.mini_chunk_blocks > self.indexer.chunk_blocks {
            bail!("indexer.mini_chunk_blocks must not exceed indexer.chunk_blocks");
        }
        Ok(())
    }

    /// Known deployment for the configured chain/protocol with overrides applied.
    /// Every address must be known or overridden.
    pub fn resolve_addresses(&self) -> Result<ResolvedAddresses> {
        let known = protocol::deployment(self.network.chain_id, self.network.protocol);
        let net = &self.network;

        let pool_manager = net
            .pool_manager
            .clone()
            .or_else(|| known.map(|d| d.pool_manager.to_string()));
        let position_manager = net
            .position_manager
            .clone()
            .or_else(|| known.map(|d| d.position_manager.to_string()));

        let (Some(pool_manager), Some(position_manager)) = (pool_manager, position_manager) else {
            bail!(
                "No {} deployment known on chain {}; set network.pool_manager and network.position_manager",
                net.protocol,
                net.chain_id
            );
        };

        Ok(ResolvedAddresses {
            pool_manager,
            position_manager,
            state_view: net
                .state_view
                .clone()
                .or_else(|| known.and_then(|d| d.state_view.map(str::to_string))),
            permit2: net
                .permit2
                .clone()
                .unwrap_or_else(|| net.protocol.permit2().to_string()),
            multicall: net
                .multicall
                .clone()
                .unwrap_or_else(|| protocol::MULTICALL3.to_string()),
        })
    }

    /// Explorer endpoint: explicit setting, else the chain's default
    pub fn explorer_api_url(&self) -> Option<String> {
        if !self.indexer.enabled {
            return None;
        }
        self.indexer
            .explorer_api_url
            .clone()
            .or_else(|| protocol::explorer_api(self.network.chain_id).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_file_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ladder.toml");

        let config_content = r#"
[network]
chain_id = 56
rpc_url = "https://rpc.example.org"
protocol = "pancakeswap"

[execution]
tx_timeout_secs = 120

[ladder]
slippage_percent = 1.5
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = LadderServiceConfig::load(Some(&config_path)).unwrap();
        assert_eq!(config.network.chain_id, 56);
        assert_eq!(config.network.protocol, ProtocolFamily::PancakeSwap);
        assert_eq!(config.execution.tx_timeout_secs, 120);
        assert_eq!(config.execution.nonce_resync_secs, service::nonce::RESYNC_INTERVAL_SECS);
        assert_eq!(config.ladder.slippage_percent, 1.5);
        assert_eq!(config.ladder.safety_multiplier, service::ladder::SAFETY_MULTIPLIER);
        assert_eq!(config.approvals.expiration_days, 365);
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("LADDER__INDEXER__API_KEY", "override-key");
        let config = LadderServiceConfig::load(None).unwrap();
        std::env::remove_var("LADDER__INDEXER__API_KEY");
        assert_eq!(config.indexer.api_key.as_deref(), Some("override-key"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let result = LadderServiceConfig::from_toml_str(
            r#"
[ladder]
safety_multiplier = 0.5
"#,
        );
        assert!(result.is_err());

        let result = LadderServiceConfig::from_toml_str(
            r#"
[indexer]
chunk_blocks = 100
mini_chunk_blocks = 500
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_addresses_with_override() {
        let config = LadderServiceConfig::from_toml_str(
            r#"
[network]
chain_id = 8453
multicall = "0x0000000000000000000000000000000000000abc"
"#,
        )
        .unwrap();
        let resolved = config.resolve_addresses().unwrap();
        assert_eq!(resolved.pool_manager, "0x498581ff718922c3f8e6a244956af099b2652b2b");
        assert_eq!(resolved.multicall, "0x0000000000000000000000000000000000000abc");
        assert_eq!(resolved.permit2, ProtocolFamily::Uniswap.permit2());
    }

    #[test]
    fn test_unknown_deployment_requires_overrides() {
        let config = LadderServiceConfig::from_toml_str(
            r#"
[network]
chain_id = 10
"#,
        )
        .unwrap();
        assert!(config.resolve_addresses().is_err());
        assert!(config.explorer_api_url().is_none());
    }
}
