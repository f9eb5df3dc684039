//! # Ladder Orchestrator - End-to-End Ladder Lifecycle
//!
//! ## Purpose
//!
//! Composes pool identity, pool reads, approvals, action encoding and nonce-safe
//! submission into the ladder entry points: pool identity, preview, approval
//! check and grant, creation and batch close.
//!
//! ## Creation States
//!
//! ```text
//! validate_fee → compute_pool_identity → create_pool_if_missing? → plan_positions
//!     → validate_balances → ensure_approvals → build_actions → estimate_gas
//!     → submit → parse_results
//! ```
//!
//! Everything up to `estimate_gas` runs before a nonce is allocated, so those
//! failures never touch the nonce ledger. A failed simulation stops the run;
//! a batch whose simulation failed is never broadcast.
//!
//! ## Outcomes
//!
//! Expected failures (bad config, missing approvals, reverts, timeouts) come
//! back as `Ok(outcome)` with `success = false`, the reason, its kind and the
//! transaction hash when one exists. `Err` is reserved for faults.

use crate::approvals::{
    unix_now, ApprovalLeg, ApprovalPolicy, ApprovalReport, ApprovalStateMachine, ApprovalTransactions,
};
use crate::chain::{ChainClient, TransactionSigner};
use crate::config::{CloseFlags, CreateFlags, LadderConfig};
use crate::decimals::DecimalsCache;
use crate::distribution::{DistributionSource, PositionSpec, ScheduleFile};
use crate::errors::{ErrorKind, LadderError};
use crate::logging::LogEmoji;
use crate::multicall::{BatchCall, BatchCallAggregator};
use crate::nonce::NonceSequencer;
use crate::pools::{create_pool, PoolReader, PoolState};
use crate::positions::{ExplorerIndexer, PositionEnumerator, PositionIndexer, PositionReader, ScanWindow};
use crate::submit::{GasLimit, TransactionSubmitter, TxRequest};
use crate::{log_error, log_execution, log_metrics, log_success};
use anyhow::{Context, Result};
use dex::abi::erc20::{decode_uint, encode_balance_of};
use dex::abi::position_manager::encode_modify_liquidities;
use dex::{batch_close, batch_mint, minted_token_ids, ClosePosition, MintParams, TransferLog};
use ethers::types::{Address, H256, U256};
use ladder_amm::ticks::{decimal_tick_offset, sqrt_price_x96, tick_to_price};
use ladder_amm::{
    bound_multiplier, classify_position, find_tick_spacing, mint_bounds, price_to_tick, realign_range,
    sort_currencies, PoolKey, PoolVariant, PositionSide, MAX_TICK, MIN_TICK,
};
use ladder_config::service::gas;
use ladder_config::{LadderServiceConfig, ProtocolFamily, ResolvedAddresses};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Contract addresses the orchestrator talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub pool_manager: Address,
    pub position_manager: Address,
    /// Where slot0/liquidity are read: the state lens, else the pool manager
    pub state_source: Address,
    pub permit2: Address,
    pub multicall: Address,
}

impl ContractAddresses {
    pub fn parse(resolved: &ResolvedAddresses) -> Result<Self> {
        let parse = |label: &str, value: &str| {
            Address::from_str(value).with_context(|| format!("invalid {label} address '{value}'"))
        };
        let pool_manager = parse("pool_manager", &resolved.pool_manager)?;
        let state_source = match resolved.state_view.as_deref() {
            Some(view) => parse("state_view", view)?,
            None => pool_manager,
        };
        Ok(Self {
            pool_manager,
            position_manager: parse("position_manager", &resolved.position_manager)?,
            state_source,
            permit2: parse("permit2", &resolved.permit2)?,
            multicall: parse("multicall", &resolved.multicall)?,
        })
    }
}

/// Key layout the protocol family's pool manager hashes
pub fn pool_variant(protocol: ProtocolFamily, pool_manager: Address) -> PoolVariant {
    if protocol.uses_alternate_pool_key() {
        PoolVariant::Alternate { pool_manager }
    } else {
        PoolVariant::Standard
    }
}

/// Locally derived pool identity
#[derive(Debug, Clone, Serialize)]
pub struct PoolIdentity {
    #[serde(skip)]
    pub key: PoolKey,
    pub pool_id: String,
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
    pub protocol: ProtocolFamily,
    /// Spacing came from the fee rather than the config
    pub spacing_suggested: bool,
    /// Whether the config's expected pool id matches, when one was given
    pub matches_expected: Option<bool>,
}

/// Derive the pool identity from a ladder config without touching the chain
pub fn compute_pool_identity(
    config: &LadderConfig,
    protocol: ProtocolFamily,
    pool_manager: Address,
) -> Result<PoolIdentity, LadderError> {
    check_protocol(config, protocol)?;
    let key = config.pool_key(pool_variant(protocol, pool_manager))?;
    let pool_id = key.id();
    let matches_expected = config.expected_pool_id()?.map(|expected| expected == pool_id);

    Ok(PoolIdentity {
        key,
        pool_id: pool_id.to_string(),
        currency0: key.currency0,
        currency1: key.currency1,
        fee: key.fee,
        tick_spacing: key.tick_spacing,
        hooks: key.hooks,
        protocol,
        spacing_suggested: config.tick_spacing.is_none(),
        matches_expected,
    })
}

fn check_protocol(config: &LadderConfig, service_protocol: ProtocolFamily) -> Result<(), LadderError> {
    match config.protocol {
        Some(protocol) if protocol != service_protocol => Err(LadderError::Configuration(format!(
            "ladder targets {protocol} but the service is configured for {service_protocol}"
        ))),
        _ => Ok(()),
    }
}

/// One position after realignment and bound sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPosition {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
    pub amount0: U256,
    pub amount1: U256,
    pub amount0_max: u128,
    pub amount1_max: u128,
    pub side: &'static str,
    #[serde(skip)]
    side_kind: PositionSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,
}

fn side_label(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Above => "above",
        PositionSide::Below => "below",
        PositionSide::Straddle => "straddle",
    }
}

/// Realign every range onto the spacing grid, classify it against the
/// reference tick and size its bounds. Both currencies are always bounded so
/// the mint still lands when the live tick has drifted from the reference.
pub fn plan_positions(
    specs: &[PositionSpec],
    tick_spacing: i32,
    reference_tick: i32,
    multiplier: Decimal,
) -> Result<Vec<PlannedPosition>, LadderError> {
    let mut planned = Vec::with_capacity(specs.len());
    for spec in specs {
        let (tick_lower, tick_upper) = realign_range(spec.tick_lower, spec.tick_upper, tick_spacing)?;
        if (tick_lower, tick_upper) != (spec.tick_lower, spec.tick_upper) {
            debug!(
                "realigned [{}, {}] -> [{}, {}] at spacing {}",
                spec.tick_lower, spec.tick_upper, tick_lower, tick_upper, tick_spacing
            );
        }

        let side = classify_position(tick_lower, tick_upper, reference_tick);
        let (amount0_max, amount1_max) = mint_bounds(
            spec.amount0,
            spec.amount1,
            spec.liquidity,
            tick_lower,
            tick_upper,
            multiplier,
        );

        planned.push(PlannedPosition {
            tick_lower,
            tick_upper,
            liquidity: spec.liquidity,
            amount0: spec.amount0,
            amount1: spec.amount1,
            amount0_max,
            amount1_max,
            side: side_label(side),
            side_kind: side,
            recipient: spec.recipient,
        });
    }
    Ok(planned)
}

/// A ladder as it would be minted
#[derive(Debug, Clone, Serialize)]
pub struct LadderPreview {
    pub pool_id: String,
    pub currency0: Address,
    pub currency1: Address,
    pub tick_spacing: i32,
    pub reference_tick: i32,
    pub pool_tick: Option<i32>,
    pub decimals0: u8,
    pub decimals1: u8,
    pub positions: Vec<PlannedPosition>,
    /// Expected raw amounts the ladder consumes
    pub required0: U256,
    pub required1: U256,
    /// Sum of the mint bounds
    pub max0: U256,
    pub max1: U256,
}

impl LadderPreview {
    fn from_positions(
        key: &PoolKey,
        reference: ReferenceTick,
        pool_tick: Option<i32>,
        positions: Vec<PlannedPosition>,
    ) -> Self {
        let mut preview = Self {
            pool_id: key.id().to_string(),
            currency0: key.currency0,
            currency1: key.currency1,
            tick_spacing: key.tick_spacing,
            reference_tick: reference.tick,
            pool_tick,
            decimals0: reference.decimals0,
            decimals1: reference.decimals1,
            positions: Vec::new(),
            required0: U256::zero(),
            required1: U256::zero(),
            max0: U256::zero(),
            max1: U256::zero(),
        };
        for position in &positions {
            if position.side_kind.needs_currency0() {
                preview.required0 = preview.required0.saturating_add(position.amount0);
            }
            if position.side_kind.needs_currency1() {
                preview.required1 = preview.required1.saturating_add(position.amount1);
            }
            preview.max0 = preview.max0.saturating_add(U256::from(position.amount0_max));
            preview.max1 = preview.max1.saturating_add(U256::from(position.amount1_max));
        }
        preview.positions = positions;
        preview
    }

    /// Both legs, quote token first
    pub fn approval_legs(&self, quote_token: Address) -> Vec<ApprovalLeg> {
        let leg0 = ApprovalLeg::new(self.currency0, self.max0);
        let leg1 = ApprovalLeg::new(self.currency1, self.max1);
        if quote_token == self.currency1 {
            vec![leg1, leg0]
        } else {
            vec![leg0, leg1]
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ReferenceTick {
    tick: i32,
    decimals0: u8,
    decimals1: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStep {
    pub step_name: String,
    pub duration_ms: u64,
    pub success: bool,
}

fn track<T>(
    steps: &mut Vec<ExecutionStep>,
    name: &str,
    started: Instant,
    result: Result<T, LadderError>,
) -> Result<T, LadderError> {
    let duration_ms = started.elapsed().as_millis() as u64;
    steps.push(ExecutionStep {
        step_name: name.to_string(),
        duration_ms,
        success: result.is_ok(),
    });
    if let Err(e) = &result {
        debug!(step = name, error = %e, "step failed after {}ms", duration_ms);
    }
    result
}

/// Result of one ladder creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct LadderOutcome {
    pub pool_id: Option<String>,
    pub positions: Vec<PlannedPosition>,
    pub pool_created: bool,
    pub approvals: Option<ApprovalReport>,
    pub approval_transactions: ApprovalTransactions,
    pub gas_estimate: Option<U256>,
    pub gas_limit: Option<U256>,
    pub tx_hash: Option<H256>,
    pub gas_used: Option<U256>,
    pub minted_ids: Vec<U256>,
    pub dry_run: bool,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub steps: Vec<ExecutionStep>,
}

impl LadderOutcome {
    fn fail(&mut self, error: &LadderError) {
        self.success = false;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self.tx_hash = self.tx_hash.or(error.tx_hash());
        self.gas_used = self.gas_used.or(error.gas_used());
    }
}

/// Result of one batch close
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloseOutcome {
    pub tx_hash: Option<H256>,
    pub gas_limit: Option<U256>,
    pub gas_used: Option<U256>,
    pub closed_ids: Vec<U256>,
    /// Positions with no liquidity left
    pub skipped_ids: Vec<U256>,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub steps: Vec<ExecutionStep>,
}

impl CloseOutcome {
    fn fail(&mut self, error: &LadderError) {
        self.success = false;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self.tx_hash = self.tx_hash.or(error.tx_hash());
        self.gas_used = self.gas_used.or(error.gas_used());
    }
}

/// Result of an approval check or grant
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalOutcome {
    pub report: Option<ApprovalReport>,
    pub transactions: ApprovalTransactions,
    pub ready: bool,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ApprovalOutcome {
    fn from_result(result: Result<(ApprovalReport, ApprovalTransactions), LadderError>) -> Self {
        match result {
            Ok((report, transactions)) => Self {
                ready: report.all_ready(),
                report: Some(report),
                transactions,
                success: true,
                ..Default::default()
            },
            Err(e) => Self {
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                ..Default::default()
            },
        }
    }
}

/// An owned position as listed for the caller
#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub token_id: U256,
    pub pool_id: String,
    pub currency0: Address,
    pub currency1: Address,
    pub fee: u32,
    pub tick_spacing: i32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub confidence: String,
    pub layout: &'static str,
}

pub struct LadderOrchestrator {
    settings: LadderServiceConfig,
    addresses: ContractAddresses,
    aggregator: Arc<BatchCallAggregator>,
    submitter: Arc<TransactionSubmitter>,
    approvals: ApprovalStateMachine,
    pool_reader: PoolReader,
    decimals: Arc<DecimalsCache>,
    distribution: Option<Arc<dyn DistributionSource>>,
    indexer: Option<Arc<dyn PositionIndexer>>,
}

impl LadderOrchestrator {
    pub fn new(
        settings: LadderServiceConfig,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        distribution: Option<Arc<dyn DistributionSource>>,
        decimals: Arc<DecimalsCache>,
    ) -> Result<Self> {
        let addresses = ContractAddresses::parse(&settings.resolve_addresses()?)?;
        let execution = &settings.execution;

        let aggregator = Arc::new(BatchCallAggregator::new(chain.clone(), addresses.multicall));
        let nonces = Arc::new(NonceSequencer::new(
            signer.address(),
            chain.clone(),
            Duration::from_secs(execution.nonce_resync_secs),
        ));
        let submitter = Arc::new(TransactionSubmitter::new(
            chain,
            signer,
            nonces,
            settings.network.chain_id,
            Duration::from_millis(execution.poll_interval_ms),
        ));
        let approvals = ApprovalStateMachine::new(
            aggregator.clone(),
            submitter.clone(),
            ApprovalPolicy {
                permit2: addresses.permit2,
                consumer: addresses.position_manager,
                expiration_days: settings.approvals.expiration_days,
                gas_buffer_percent: execution.approval_gas_buffer_percent,
                receipt_timeout: Duration::from_secs(execution.tx_timeout_secs),
            },
        );
        let pool_reader = PoolReader::new(aggregator.clone(), addresses.state_source);

        let indexer = match settings.explorer_api_url() {
            Some(url) => {
                let explorer = ExplorerIndexer::new(url, settings.indexer.api_key.clone(), addresses.position_manager)?;
                Some(Arc::new(explorer) as Arc<dyn PositionIndexer>)
            }
            None => None,
        };

        info!(
            "{} Ladder orchestrator ready: chain {} {} position manager {:?} signer {:?}",
            LogEmoji::POOL,
            settings.network.chain_id,
            settings.network.protocol,
            addresses.position_manager,
            submitter.sender()
        );

        Ok(Self {
            settings,
            addresses,
            aggregator,
            submitter,
            approvals,
            pool_reader,
            decimals,
            distribution,
            indexer,
        })
    }

    /// Replace the explorer indexer built from the service settings
    pub fn with_indexer(mut self, indexer: Option<Arc<dyn PositionIndexer>>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    pub fn nonces(&self) -> &Arc<NonceSequencer> {
        self.submitter.nonces()
    }

    pub fn sender(&self) -> Address {
        self.submitter.sender()
    }

    fn protocol(&self) -> ProtocolFamily {
        self.settings.network.protocol
    }

    fn receipt_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or_else(|| Duration::from_secs(self.settings.execution.tx_timeout_secs))
    }

    fn deadline(&self) -> u64 {
        unix_now() + self.settings.execution.deadline_secs
    }

    pub fn compute_pool_identity(&self, config: &LadderConfig) -> Result<PoolIdentity, LadderError> {
        compute_pool_identity(config, self.protocol(), self.addresses.pool_manager)
    }

    /// Pool key for the ladder. When the caller expects a different pool id,
    /// the on-chain fee is read at that id and tick spacings are searched
    /// until one reproduces it.
    pub async fn resolve_pool_key(&self, config: &LadderConfig) -> Result<PoolKey, LadderError> {
        let identity = self.compute_pool_identity(config)?;
        let key = identity.key;
        let computed = key.id();

        let Some(expected) = config.expected_pool_id()? else {
            return Ok(key);
        };
        if expected == computed {
            debug!(pool_id = %computed, "computed pool id matches expected");
            return Ok(key);
        }

        warn!(%expected, %computed, "pool id mismatch, attempting reconciliation");
        let state = self.pool_reader.read(&expected).await?;
        if !state.initialized {
            return Err(LadderError::IdentityMismatch {
                expected,
                computed,
                detail: "the expected pool is not initialized on chain".to_string(),
            });
        }

        let mut fees = vec![state.lp_fee];
        if key.fee != state.lp_fee {
            fees.push(key.fee);
        }
        for fee in &fees {
            if let Some(spacing) = find_tick_spacing(*fee, &expected, &key) {
                info!(
                    "{} Reconciled pool {} with fee {} and tick spacing {}",
                    LogEmoji::POOL,
                    expected,
                    fee,
                    spacing
                );
                return Ok(key.with_params(*fee, spacing));
            }
        }

        Err(LadderError::IdentityMismatch {
            expected,
            computed,
            detail: format!("no tick spacing reproduces the expected id with fee(s) {fees:?}"),
        })
    }

    async fn reference_tick(&self, config: &LadderConfig, key: &PoolKey) -> Result<ReferenceTick, LadderError> {
        let decimals = self
            .decimals
            .resolve(&self.aggregator, &[key.currency0, key.currency1])
            .await?;
        let decimals0 = decimals.get(&key.currency0).copied().unwrap_or(crate::decimals::DEFAULT_DECIMALS);
        let decimals1 = decimals.get(&key.currency1).copied().unwrap_or(crate::decimals::DEFAULT_DECIMALS);

        let tick = price_to_tick(config.reference_price, config.invert)? + decimal_tick_offset(decimals0, decimals1);
        Ok(ReferenceTick {
            tick: tick.clamp(MIN_TICK, MAX_TICK),
            decimals0,
            decimals1,
        })
    }

    fn distribution_for(&self, config: &LadderConfig) -> Result<Arc<dyn DistributionSource>, LadderError> {
        if let Some(path) = &config.schedule {
            return Ok(Arc::new(ScheduleFile::new(path.clone())));
        }
        self.distribution
            .clone()
            .ok_or_else(|| LadderError::Configuration("no position schedule configured for this ladder".to_string()))
    }

    fn multiplier(&self, config: &LadderConfig) -> Result<Decimal, LadderError> {
        let from_settings = |value: f64, name: &str| {
            Decimal::from_f64(value)
                .ok_or_else(|| LadderError::Configuration(format!("{name} {value} is not representable")))
        };
        let safety = match config.safety_multiplier {
            Some(safety) => safety,
            None => from_settings(self.settings.ladder.safety_multiplier, "safety_multiplier")?,
        };
        let slippage = match config.slippage_percent {
            Some(slippage) => slippage,
            None => from_settings(self.settings.ladder.slippage_percent, "slippage_percent")?,
        };
        Ok(bound_multiplier(safety, slippage))
    }

    async fn plan(
        &self,
        config: &LadderConfig,
        key: &PoolKey,
        pool: Option<&PoolState>,
    ) -> Result<LadderPreview, LadderError> {
        let reference = self.reference_tick(config, key).await?;
        let request = config.distribution_request(reference.decimals0, reference.decimals1);
        let specs = self
            .distribution_for(config)?
            .positions(&request)
            .map_err(|e| LadderError::Configuration(format!("distribution failed: {e:#}")))?;

        let pool_tick = pool.filter(|state| state.initialized).map(|state| state.tick);
        if let Some(pool_tick) = pool_tick {
            let deviation = (pool_tick - reference.tick).abs();
            if deviation > self.settings.ladder.tick_deviation_warning {
                warn!(
                    pool_tick,
                    reference_tick = reference.tick,
                    deviation,
                    "{} pool tick is far from the declared reference price; sides follow the reference",
                    LogEmoji::WARNING
                );
            }
        }

        let positions = plan_positions(&specs, key.tick_spacing, reference.tick, self.multiplier(config)?)?;
        let preview = LadderPreview::from_positions(key, reference, pool_tick, positions);
        log_metrics!(
            "ladder plan: {} positions, reference tick {}, max0 {}, max1 {}",
            preview.positions.len(),
            preview.reference_tick,
            preview.max0,
            preview.max1
        );
        Ok(preview)
    }

    /// Positions as they would be minted, with bounds and sides
    pub async fn preview_ladder(&self, config: &LadderConfig) -> Result<LadderPreview, LadderError> {
        config
            .validate()
            .map_err(|e| LadderError::Configuration(format!("{e:#}")))?;
        let key = self.resolve_pool_key(config).await?;
        let state = self.pool_reader.read(&key.id()).await?;
        self.plan(config, &key, Some(&state)).await
    }

    async fn approval_legs(&self, config: &LadderConfig) -> Result<Vec<ApprovalLeg>, LadderError> {
        let key = self.resolve_pool_key(config).await?;
        let preview = self.plan(config, &key, None).await?;
        Ok(preview.approval_legs(config.quote_token))
    }

    /// Read-only view of both approval legs
    pub async fn check_approvals(&self, config: &LadderConfig) -> Result<ApprovalOutcome> {
        let result = match self.approval_legs(config).await {
            Ok(legs) => self
                .approvals
                .inspect(&legs)
                .await
                .map(|report| (report, ApprovalTransactions::default())),
            Err(e) => Err(e),
        };
        Ok(ApprovalOutcome::from_result(result))
    }

    /// Drive both legs to the ready state
    pub async fn approve_for_ladder(&self, config: &LadderConfig) -> Result<ApprovalOutcome> {
        let result = match self.approval_legs(config).await {
            Ok(legs) => self.approvals.ensure(&legs).await,
            Err(e) => Err(e),
        };
        let outcome = ApprovalOutcome::from_result(result);
        match &outcome.error {
            None => log_success!(
                "approvals ready ({} erc20, {} permit2 transaction(s))",
                outcome.transactions.erc20.len(),
                outcome.transactions.permit2.len()
            ),
            Some(error) => log_error!("approval failed: {}", error),
        }
        Ok(outcome)
    }

    async fn ensure_pool(
        &self,
        config: &LadderConfig,
        key: &PoolKey,
        flags: &CreateFlags,
    ) -> Result<(PoolState, bool), LadderError> {
        let pool_id = key.id();
        let state = self.pool_reader.read(&pool_id).await?;
        if state.initialized {
            return Ok((state, false));
        }
        if !flags.create_pool_if_missing {
            return Err(LadderError::Configuration(format!(
                "pool {pool_id} is not initialized; enable create_pool_if_missing to create it"
            )));
        }

        let reference = self.reference_tick(config, key).await?;
        let sqrt_price = sqrt_price_x96(tick_to_price(reference.tick, false))?;
        if flags.dry_run {
            info!(
                "{} Dry run: would create pool {} at tick {} (sqrtPriceX96 {})",
                LogEmoji::POOL,
                pool_id,
                reference.tick,
                sqrt_price
            );
            return Ok((state, false));
        }

        create_pool(
            &self.submitter,
            self.addresses.position_manager,
            key,
            sqrt_price,
            self.receipt_timeout(flags.receipt_timeout),
        )
        .await?;

        let state = self.pool_reader.read(&pool_id).await?;
        if !state.initialized {
            return Err(LadderError::Configuration(format!(
                "pool {pool_id} still reads uninitialized after creation"
            )));
        }
        Ok((state, true))
    }

    async fn check_balances(&self, preview: &LadderPreview) -> Result<(), LadderError> {
        let owner = self.sender();
        let needs = [
            (preview.currency0, preview.required0),
            (preview.currency1, preview.required1),
        ];
        let calls = needs
            .iter()
            .map(|(token, _)| BatchCall::new(*token, encode_balance_of(owner), "balanceOf", decode_uint))
            .collect();
        let balances = self.aggregator.execute(calls).await?;

        for ((token, need), have) in needs.into_iter().zip(balances) {
            let have = have.unwrap_or_default();
            if have < need {
                return Err(LadderError::InsufficientBalance { token, have, need });
            }
            debug!(?token, %have, %need, "balance sufficient");
        }
        Ok(())
    }

    fn build_mint_call(&self, key: &PoolKey, preview: &LadderPreview) -> Result<Vec<u8>, LadderError> {
        let owner = self.sender();
        let mints: Vec<MintParams> = preview
            .positions
            .iter()
            .map(|position| MintParams {
                key: *key,
                tick_lower: position.tick_lower,
                tick_upper: position.tick_upper,
                liquidity: position.liquidity,
                amount0_max: position.amount0_max,
                amount1_max: position.amount1_max,
                owner: position.recipient.unwrap_or(owner),
                hook_data: Vec::new(),
            })
            .collect();

        let payload = batch_mint(&mints).map_err(|e| LadderError::Configuration(e.to_string()))?;
        debug!("mint payload: {} actions for {} positions", payload.len(), mints.len());
        Ok(encode_modify_liquidities(payload.encode(), self.deadline()))
    }

    /// Mint the whole ladder in one unlock call
    pub async fn create_ladder(&self, config: &LadderConfig, flags: &CreateFlags) -> Result<LadderOutcome> {
        let mut outcome = LadderOutcome {
            dry_run: flags.dry_run,
            ..Default::default()
        };

        match self.run_create(config, flags, &mut outcome).await {
            Ok(()) => {
                outcome.success = true;
                if flags.dry_run {
                    log_success!(
                        "dry run complete: {} positions, gas estimate {:?}",
                        outcome.positions.len(),
                        outcome.gas_estimate
                    );
                } else {
                    log_success!(
                        "ladder minted: {} positions in {:?}, ids {:?}",
                        outcome.positions.len(),
                        outcome.tx_hash,
                        outcome.minted_ids
                    );
                }
            }
            Err(e) => {
                log_error!("ladder creation failed: {}", e);
                outcome.fail(&e);
            }
        }
        Ok(outcome)
    }

    async fn run_create(
        &self,
        config: &LadderConfig,
        flags: &CreateFlags,
        outcome: &mut LadderOutcome,
    ) -> Result<(), LadderError> {
        let steps = &mut outcome.steps;

        let started = Instant::now();
        let validated = config
            .validate()
            .map_err(|e| LadderError::Configuration(format!("{e:#}")))
            .and_then(|_| config.fee_parts());
        track(steps, "validate_fee", started, validated)?;

        let started = Instant::now();
        let resolved = self.resolve_pool_key(config).await;
        let key = track(steps, "compute_pool_identity", started, resolved)?;
        outcome.pool_id = Some(key.id().to_string());

        let started = Instant::now();
        let pool = self.ensure_pool(config, &key, flags).await;
        let (state, created) = track(steps, "create_pool_if_missing", started, pool)?;
        outcome.pool_created = created;

        let started = Instant::now();
        let planned = self.plan(config, &key, Some(&state)).await;
        let preview = track(steps, "plan_positions", started, planned)?;
        outcome.positions = preview.positions.clone();

        let started = Instant::now();
        let balances = self.check_balances(&preview).await;
        track(steps, "validate_balances", started, balances)?;

        let legs = preview.approval_legs(config.quote_token);
        let started = Instant::now();
        let approvals = if flags.dry_run {
            self.approvals
                .inspect(&legs)
                .await
                .map(|report| (report, ApprovalTransactions::default()))
        } else if flags.skip_approvals {
            self.approvals
                .verify(&legs)
                .await
                .map(|report| (report, ApprovalTransactions::default()))
        } else {
            self.approvals.ensure(&legs).await
        };
        let (report, sent) = track(steps, "ensure_approvals", started, approvals)?;
        if flags.dry_run && !report.all_ready() {
            warn!("dry run: approvals are not in place yet; a live run would send them");
        }
        outcome.approvals = Some(report);
        outcome.approval_transactions = sent;

        let started = Instant::now();
        let built = self.build_mint_call(&key, &preview);
        let call_data = track(steps, "build_actions", started, built)?;

        if flags.dry_run && !state.initialized {
            warn!("dry run: pool does not exist yet, gas estimation skipped");
            return Ok(());
        }

        let started = Instant::now();
        let estimated = self
            .submitter
            .estimate(self.addresses.position_manager, &call_data, U256::zero())
            .await;
        let estimate = track(steps, "estimate_gas", started, estimated)?;
        let gas_limit =
            estimate * U256::from(self.settings.execution.unlock_gas_multiplier_percent) / U256::from(100u64);
        outcome.gas_estimate = Some(estimate);
        outcome.gas_limit = Some(gas_limit);
        info!("{} Unlock gas estimate {} -> limit {}", LogEmoji::GAS, estimate, gas_limit);

        if flags.dry_run {
            return Ok(());
        }

        log_execution!(
            "submitting {} mints to {:?}",
            preview.positions.len(),
            self.addresses.position_manager
        );
        let started = Instant::now();
        let request = TxRequest::new(
            self.addresses.position_manager,
            call_data,
            GasLimit::Fixed(gas_limit),
            "modifyLiquidities (mint ladder)",
        );
        let submitted = self
            .submitter
            .submit(request, self.receipt_timeout(flags.receipt_timeout))
            .await;
        let submitted = track(steps, "submit", started, submitted)?;
        outcome.tx_hash = Some(submitted.tx_hash);
        outcome.gas_used = submitted.gas_used;

        let started = Instant::now();
        let minted = minted_token_ids(
            submitted
                .receipt
                .logs
                .iter()
                .map(|log| TransferLog::new(log.address, &log.topics)),
            self.addresses.position_manager,
        );
        if minted.len() != preview.positions.len() {
            warn!(
                "expected {} minted ids in receipt, found {}",
                preview.positions.len(),
                minted.len()
            );
        }
        for id in &minted {
            info!("{} Minted position {}", LogEmoji::MINT, id);
        }
        outcome.minted_ids = track(steps, "parse_results", started, Ok(minted))?;
        Ok(())
    }

    /// Remove liquidity from positions of one pair in a single unlock call
    pub async fn close_positions(
        &self,
        token_ids: &[U256],
        currency0: Address,
        currency1: Address,
        flags: &CloseFlags,
    ) -> Result<CloseOutcome> {
        let mut outcome = CloseOutcome::default();
        match self.run_close(token_ids, currency0, currency1, flags, &mut outcome).await {
            Ok(()) => {
                outcome.success = true;
                log_success!("closed {} position(s) in {:?}", outcome.closed_ids.len(), outcome.tx_hash);
            }
            Err(e) => {
                log_error!("close failed: {}", e);
                outcome.fail(&e);
            }
        }
        Ok(outcome)
    }

    async fn run_close(
        &self,
        token_ids: &[U256],
        currency0: Address,
        currency1: Address,
        flags: &CloseFlags,
        outcome: &mut CloseOutcome,
    ) -> Result<(), LadderError> {
        let steps = &mut outcome.steps;
        if token_ids.is_empty() {
            return Err(LadderError::Configuration("no position ids to close".to_string()));
        }
        let pair = sort_currencies(currency0, currency1);

        let started = Instant::now();
        let reader = PositionReader::new(self.aggregator.clone(), self.addresses.position_manager, self.protocol());
        let read = reader.read_each(token_ids).await;
        let reads = track(steps, "read_positions", started, read)?;

        let mut positions = Vec::with_capacity(reads.len());
        for (id, read) in token_ids.iter().zip(reads) {
            match read {
                Ok(position) => positions.push(position),
                Err(e) => {
                    warn!(token_id = %id, error = %e, "position unreadable, skipping");
                    outcome.skipped_ids.push(*id);
                }
            }
        }

        let mut closes = Vec::with_capacity(positions.len());
        for position in &positions {
            if (position.key.currency0, position.key.currency1) != pair {
                return Err(LadderError::Configuration(format!(
                    "position {} belongs to {:?}/{:?}, not {:?}/{:?}",
                    position.token_id, position.key.currency0, position.key.currency1, pair.0, pair.1
                )));
            }
            if position.liquidity() == 0 {
                warn!(token_id = %position.token_id, "position has no liquidity, skipping");
                outcome.skipped_ids.push(position.token_id);
                continue;
            }
            closes.push(ClosePosition {
                token_id: position.token_id,
                liquidity: U256::from(position.liquidity()),
                amount0_min: 0,
                amount1_min: 0,
                currency0: position.key.currency0,
                currency1: position.key.currency1,
                burn: flags.burn,
            });
        }
        if closes.is_empty() {
            return Err(LadderError::Configuration(format!(
                "none of the {} position(s) can be closed: {} skipped as unreadable or empty",
                token_ids.len(),
                outcome.skipped_ids.len()
            )));
        }

        let started = Instant::now();
        let built = batch_close(&closes, self.sender())
            .map_err(|e| LadderError::Configuration(e.to_string()))
            .map(|payload| encode_modify_liquidities(payload.encode(), self.deadline()));
        let call_data = track(steps, "build_actions", started, built)?;

        let gas_limit = match flags.gas_limit {
            Some(limit) => U256::from(limit),
            None => U256::from(gas::CLOSE_BATCH_MINIMUM.max(closes.len() as u64 * gas::CLOSE_PER_POSITION)),
        };
        outcome.gas_limit = Some(gas_limit);

        log_execution!("closing {} position(s), gas limit {}", closes.len(), gas_limit);
        let started = Instant::now();
        let request = TxRequest::new(
            self.addresses.position_manager,
            call_data,
            GasLimit::Fixed(gas_limit),
            "modifyLiquidities (close)",
        );
        let submitted = self
            .submitter
            .submit(request, self.receipt_timeout(flags.receipt_timeout))
            .await;
        let submitted = track(steps, "submit", started, submitted)?;

        outcome.tx_hash = Some(submitted.tx_hash);
        outcome.gas_used = submitted.gas_used;
        outcome.closed_ids = closes.iter().map(|close| close.token_id).collect();
        for id in &outcome.closed_ids {
            info!("{} Closed position {}", LogEmoji::BURN, id);
        }
        Ok(())
    }

    /// Positions held by `owner` (the signer when absent)
    pub async fn list_positions(&self, owner: Option<Address>) -> Result<Vec<PositionSummary>, LadderError> {
        let owner = owner.unwrap_or_else(|| self.sender());
        let indexer = &self.settings.indexer;
        let enumerator = PositionEnumerator::new(
            self.aggregator.chain().clone(),
            self.aggregator.clone(),
            self.addresses.position_manager,
            self.indexer.clone(),
            ScanWindow {
                window_blocks: indexer.scan_window_blocks,
                chunk_blocks: indexer.chunk_blocks,
                mini_chunk_blocks: indexer.mini_chunk_blocks,
            },
        );
        let ids = enumerator.enumerate_owned(owner).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let reader = PositionReader::new(self.aggregator.clone(), self.addresses.position_manager, self.protocol());
        let reads = reader.read_each(&ids).await?;
        Ok(ids
            .iter()
            .zip(reads)
            .filter_map(|(id, read)| match read {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!(token_id = %id, error = %e, "owned position unreadable, leaving it out");
                    None
                }
            })
            .map(|position| PositionSummary {
                token_id: position.token_id,
                pool_id: position.key.id().to_string(),
                currency0: position.key.currency0,
                currency1: position.key.currency1,
                fee: position.key.fee,
                tick_spacing: position.key.tick_spacing,
                tick_lower: position.info.tick_lower,
                tick_upper: position.info.tick_upper,
                liquidity: position.info.liquidity,
                confidence: format!("{:?}", position.info.confidence).to_lowercase(),
                layout: position.info.layout,
            })
            .collect())
    }
}
