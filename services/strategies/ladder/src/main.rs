//! Ladder CLI - pool identity, previews, approvals, ladder creation and close
//!
//! Usage:
//!   ladder --service-config config/bsc.toml pool-id --ladder ladders/usdt-usdc.toml
//!   ladder create --ladder ladders/usdt-usdc.toml --dry-run
//!   ladder close --ids 1201,1202 --currency0 0x.. --currency1 0x.. --burn
//!
//! The signing key is read from `LADDER_PRIVATE_KEY`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, U256};
use ladder_config::LadderServiceConfig;
use ladder_strategy::chain::{ChainClient, EthersChain, WalletSigner};
use ladder_strategy::orchestrator::{compute_pool_identity, ContractAddresses};
use ladder_strategy::{logging, CloseFlags, CreateFlags, DecimalsCache, LadderConfig, LadderOrchestrator};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ladder")]
#[command(about = "Liquidity ladder transaction tool")]
#[command(version)]
struct Cli {
    /// Service configuration (TOML); `LADDER__*` variables override it
    #[arg(long, global = true, env = "LADDER_SERVICE_CONFIG")]
    service_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the pool identity a ladder targets (no network access)
    PoolId {
        #[arg(long)]
        ladder: PathBuf,
    },

    /// Show the positions, sides and bounds a ladder would mint
    Preview {
        #[arg(long)]
        ladder: PathBuf,
    },

    /// Report the approval state of both ladder tokens
    CheckApprovals {
        #[arg(long)]
        ladder: PathBuf,
    },

    /// Send whatever approvals the ladder is missing
    Approve {
        #[arg(long)]
        ladder: PathBuf,
    },

    /// Mint the ladder in one transaction
    Create {
        #[arg(long)]
        ladder: PathBuf,

        /// Verify approvals instead of sending them
        #[arg(long)]
        skip_approvals: bool,

        /// Initialize the pool when it does not exist yet
        #[arg(long)]
        create_pool: bool,

        /// Stop after gas estimation
        #[arg(long)]
        dry_run: bool,

        /// Receipt timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Remove liquidity from positions in one transaction
    Close {
        /// Position ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,

        #[arg(long)]
        currency0: Address,

        #[arg(long)]
        currency1: Address,

        /// Burn the position NFTs as well
        #[arg(long)]
        burn: bool,

        #[arg(long)]
        gas_limit: Option<u64>,

        /// Receipt timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List positions held by an address (the signer by default)
    Positions {
        #[arg(long)]
        owner: Option<Address>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn parse_token_id(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).with_context(|| format!("invalid position id '{raw}'")),
        None => U256::from_dec_str(raw).with_context(|| format!("invalid position id '{raw}'")),
    }
}

fn build_orchestrator(settings: &LadderServiceConfig) -> Result<LadderOrchestrator> {
    let chain: Arc<dyn ChainClient> = Arc::new(EthersChain::connect(&settings.network.rpc_url)?);
    let signer = Arc::new(WalletSigner::from_env(settings.network.chain_id)?);
    LadderOrchestrator::new(
        settings.clone(),
        chain,
        signer,
        None,
        Arc::new(DecimalsCache::with_known()),
    )
}

fn load_ladder(path: &Path) -> Result<LadderConfig> {
    let ladder = LadderConfig::load(path)?;
    info!(
        "Loaded ladder {:?}: {} positions over [{}, {}]",
        path, ladder.position_count, ladder.price_lower, ladder.price_upper
    );
    Ok(ladder)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = LadderServiceConfig::load(cli.service_config.as_deref())?;
    logging::init(&settings.logging)?;

    match cli.command {
        Command::PoolId { ladder } => {
            let ladder = load_ladder(&ladder)?;
            let addresses = ContractAddresses::parse(&settings.resolve_addresses()?)?;
            let identity = compute_pool_identity(&ladder, settings.network.protocol, addresses.pool_manager)?;
            if identity.matches_expected == Some(false) {
                warn!("computed pool id differs from the configured pool_id; create will try to reconcile");
            }
            print_json(&identity)
        }
        Command::Preview { ladder } => {
            let ladder = load_ladder(&ladder)?;
            let preview = build_orchestrator(&settings)?.preview_ladder(&ladder).await?;
            print_json(&preview)
        }
        Command::CheckApprovals { ladder } => {
            let ladder = load_ladder(&ladder)?;
            let outcome = build_orchestrator(&settings)?.check_approvals(&ladder).await?;
            print_json(&outcome)?;
            if !outcome.success {
                bail!("approval check failed");
            }
            Ok(())
        }
        Command::Approve { ladder } => {
            let ladder = load_ladder(&ladder)?;
            let outcome = build_orchestrator(&settings)?.approve_for_ladder(&ladder).await?;
            print_json(&outcome)?;
            if !outcome.success {
                bail!("approval failed");
            }
            Ok(())
        }
        Command::Create {
            ladder,
            skip_approvals,
            create_pool,
            dry_run,
            timeout,
        } => {
            let ladder = load_ladder(&ladder)?;
            let flags = CreateFlags {
                skip_approvals,
                create_pool_if_missing: create_pool,
                dry_run,
                receipt_timeout: timeout.map(Duration::from_secs),
            };
            let outcome = build_orchestrator(&settings)?.create_ladder(&ladder, &flags).await?;
            print_json(&outcome)?;
            if !outcome.success {
                bail!("ladder creation failed");
            }
            Ok(())
        }
        Command::Close {
            ids,
            currency0,
            currency1,
            burn,
            gas_limit,
            timeout,
        } => {
            let token_ids = ids.iter().map(|id| parse_token_id(id)).collect::<Result<Vec<_>>>()?;
            let flags = CloseFlags {
                burn,
                receipt_timeout: timeout.map(Duration::from_secs),
                gas_limit,
            };
            let outcome = build_orchestrator(&settings)?
                .close_positions(&token_ids, currency0, currency1, &flags)
                .await?;
            print_json(&outcome)?;
            if !outcome.success {
                bail!("close failed");
            }
            Ok(())
        }
        Command::Positions { owner } => {
            let positions = build_orchestrator(&settings)?.list_positions(owner).await?;
            print_json(&positions)
        }
    }
}
