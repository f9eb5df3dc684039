//! Pool state reads and pool creation

use crate::errors::LadderError;
use crate::log_search;
use crate::logging::LogEmoji;
use crate::multicall::{BatchCall, BatchCallAggregator};
use crate::submit::{GasLimit, SubmittedTx, TransactionSubmitter, TxRequest};
use dex::abi::pool_manager::{decode_liquidity, decode_slot0, encode_get_liquidity, encode_get_slot0};
use dex::abi::position_manager::encode_initialize_pool;
use dex::Slot0;
use ethers::types::{Address, U256};
use ladder_amm::{PoolId, PoolKey};
use ladder_config::service::gas;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
    pub lp_fee: u32,
    pub liquidity: u128,
    pub initialized: bool,
}

impl PoolState {
    fn from_reads(slot0: Slot0, liquidity: Option<u128>) -> Self {
        Self {
            sqrt_price_x96: slot0.sqrt_price_x96,
            tick: slot0.tick,
            protocol_fee: slot0.protocol_fee,
            lp_fee: slot0.lp_fee,
            liquidity: liquidity.unwrap_or_default(),
            initialized: slot0.is_initialized(),
        }
    }
}

enum PoolRead {
    Slot0(Slot0),
    Liquidity(u128),
}

/// Reads pool state from the state lens (or the pool manager where no lens exists)
pub struct PoolReader {
    aggregator: Arc<BatchCallAggregator>,
    state_source: Address,
}

impl PoolReader {
    pub fn new(aggregator: Arc<BatchCallAggregator>, state_source: Address) -> Self {
        Self {
            aggregator,
            state_source,
        }
    }

    /// slot0 and active liquidity in one round trip. slot0 is required;
    /// liquidity is reported as zero when unreadable.
    pub async fn read(&self, pool_id: &PoolId) -> Result<PoolState, LadderError> {
        let calls = vec![
            BatchCall::new(
                self.state_source,
                encode_get_slot0(pool_id),
                "getSlot0",
                |data| decode_slot0(data).map(PoolRead::Slot0),
            ),
            BatchCall::new(
                self.state_source,
                encode_get_liquidity(pool_id),
                "getLiquidity",
                |data| decode_liquidity(data).map(PoolRead::Liquidity),
            )
            .optional(),
        ];
        let mut results = self.aggregator.execute(calls).await?.into_iter();

        let slot0 = match results.next().flatten() {
            Some(PoolRead::Slot0(slot0)) => slot0,
            _ => {
                return Err(LadderError::Configuration(format!(
                    "slot0 for pool {pool_id} did not decode"
                )))
            }
        };
        let liquidity = match results.next().flatten() {
            Some(PoolRead::Liquidity(liquidity)) => Some(liquidity),
            _ => None,
        };

        let state = PoolState::from_reads(slot0, liquidity);
        log_search!(
            "pool {} tick={} lp_fee={} liquidity={} initialized={}",
            pool_id,
            state.tick,
            state.lp_fee,
            state.liquidity,
            state.initialized
        );
        Ok(state)
    }
}

/// Initialize a pool at `sqrt_price_x96` through the position manager
pub async fn create_pool(
    submitter: &TransactionSubmitter,
    position_manager: Address,
    key: &PoolKey,
    sqrt_price_x96: U256,
    receipt_timeout: Duration,
) -> Result<SubmittedTx, LadderError> {
    info!("{} Creating pool {} at sqrtPriceX96 {}", LogEmoji::POOL, key.id(), sqrt_price_x96);
    let request = TxRequest::new(
        position_manager,
        encode_initialize_pool(key, sqrt_price_x96),
        GasLimit::Estimate {
            multiplier_percent: 120,
            fallback: Some(gas::INITIALIZE_POOL),
        },
        "initialize pool",
    );
    submitter.submit(request, receipt_timeout).await
}
