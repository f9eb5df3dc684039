//! # Position Reads and Ownership Enumeration
//!
//! ## Purpose
//!
//! Reads existing liquidity positions from the position manager and finds
//! which position NFTs an owner holds.
//!
//! ## Reads
//!
//! - **Uniswap family**: `getPoolAndPositionInfo` + `getPositionLiquidity`,
//!   with the info value disambiguated by tick-spacing alignment
//! - **PancakeSwap family**: a single `positions` call carrying explicit ticks
//!
//! ## Enumeration Order
//!
//! 1. `balanceOf`; zero means nothing to find
//! 2. ERC721-enumerable `tokenOfOwnerByIndex`
//! 3. off-chain explorer indexer (best effort)
//! 4. Transfer log scan over a bounded recent window, chunked, re-splitting
//!    chunks the provider rejects as too large; candidates are verified with
//!    batched `ownerOf`

use crate::chain::ChainClient;
use crate::errors::{ChainError, LadderError};
use crate::log_search;
use crate::multicall::{BatchCall, BatchCallAggregator};
use anyhow::Context;
use async_trait::async_trait;
use dex::abi::erc20::{decode_uint, encode_balance_of};
use dex::abi::position_manager::{
    decode_owner_of, decode_pool_and_position_info, decode_position_liquidity, decode_positions, decode_token_id,
    encode_get_pool_and_position_info, encode_get_position_liquidity, encode_owner_of, encode_positions,
    encode_token_of_owner_by_index,
};
use dex::{
    decode_position_info, DecodeConfidence, DecodedPositionInfo, DecodedTicks, KeyLayout, PoolRef, RawPositionInfo,
    ERC721_TRANSFER,
};
use ethers::types::{Address, Filter, H256, U256};
use ladder_amm::PoolKey;
use ladder_config::ProtocolFamily;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A position as read back from chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionDetails {
    pub token_id: U256,
    pub key: PoolKey,
    pub info: DecodedPositionInfo,
}

impl PositionDetails {
    pub fn liquidity(&self) -> u128 {
        self.info.liquidity
    }
}

enum PositionRead {
    Info(PoolKey, RawPositionInfo),
    Liquidity(u128),
    Explicit(PoolKey, i32, i32, u128),
}

pub struct PositionReader {
    aggregator: Arc<BatchCallAggregator>,
    position_manager: Address,
    protocol: ProtocolFamily,
}

impl PositionReader {
    pub fn new(aggregator: Arc<BatchCallAggregator>, position_manager: Address, protocol: ProtocolFamily) -> Self {
        Self {
            aggregator,
            position_manager,
            protocol,
        }
    }

    /// Read every position in one batch. A position that does not exist is a
    /// configuration error; an undecidable info value is a decode ambiguity.
    pub async fn read(&self, token_ids: &[U256]) -> Result<Vec<PositionDetails>, LadderError> {
        self.read_each(token_ids).await?.into_iter().collect()
    }

    /// Like [`read`](Self::read), but one bad id does not sink the rest: the
    /// outer error is the batch call itself, the inner results follow
    /// `token_ids` in order.
    pub async fn read_each(&self, token_ids: &[U256]) -> Result<Vec<Result<PositionDetails, LadderError>>, LadderError> {
        match self.protocol {
            ProtocolFamily::Uniswap => self.read_packed(token_ids).await,
            ProtocolFamily::PancakeSwap => self.read_explicit(token_ids).await,
        }
    }

    async fn read_packed(&self, token_ids: &[U256]) -> Result<Vec<Result<PositionDetails, LadderError>>, LadderError> {
        let mut calls = Vec::with_capacity(token_ids.len() * 2);
        for id in token_ids {
            calls.push(
                BatchCall::new(
                    self.position_manager,
                    encode_get_pool_and_position_info(*id),
                    format!("getPoolAndPositionInfo({id})"),
                    |data| {
                        decode_pool_and_position_info(data, KeyLayout::Standard)
                            .map(|(key, info)| PositionRead::Info(key, info))
                    },
                )
                .optional(),
            );
            calls.push(
                BatchCall::new(
                    self.position_manager,
                    encode_get_position_liquidity(*id),
                    format!("getPositionLiquidity({id})"),
                    |data| decode_position_liquidity(data).map(PositionRead::Liquidity),
                )
                .optional(),
            );
        }

        let results = self.aggregator.execute(calls).await?;
        Ok(token_ids
            .iter()
            .zip(results.chunks(2))
            .map(|(id, pair)| -> Result<PositionDetails, LadderError> {
                let Some(Some(PositionRead::Info(key, raw))) = pair.first() else {
                    return Err(LadderError::Configuration(format!("position {id} not found")));
                };
                let liquidity = match pair.get(1) {
                    Some(Some(PositionRead::Liquidity(liquidity))) => *liquidity,
                    _ => {
                        warn!(token_id = %id, "position liquidity unreadable, assuming 0");
                        0
                    }
                };

                let ticks = decode_position_info(raw, key.tick_spacing)?;
                if ticks.confidence != DecodeConfidence::Strong {
                    warn!(token_id = %id, layout = ticks.layout, confidence = ?ticks.confidence, "position range decoded without alignment check");
                }
                if let RawPositionInfo::Packed(packed) = raw {
                    let prefix = dex::abi::position_info::truncated_pool_id(*packed);
                    if ticks.layout == "standard" && !key.id().matches_truncated(&prefix) {
                        debug!(token_id = %id, "packed pool id prefix differs from inline key");
                    }
                }

                Ok(PositionDetails {
                    token_id: *id,
                    key: *key,
                    info: DecodedPositionInfo::new(PoolRef::Full(key.id()), ticks, liquidity),
                })
            })
            .collect())
    }

    async fn read_explicit(&self, token_ids: &[U256]) -> Result<Vec<Result<PositionDetails, LadderError>>, LadderError> {
        let calls = token_ids
            .iter()
            .map(|id| {
                BatchCall::new(
                    self.position_manager,
                    encode_positions(*id),
                    format!("positions({id})"),
                    |data| {
                        decode_positions(data)
                            .map(|(key, lower, upper, liquidity)| PositionRead::Explicit(key, lower, upper, liquidity))
                    },
                )
                .optional()
            })
            .collect();

        let results = self.aggregator.execute(calls).await?;
        Ok(token_ids
            .iter()
            .zip(results)
            .map(|(id, result)| -> Result<PositionDetails, LadderError> {
                let Some(PositionRead::Explicit(key, tick_lower, tick_upper, liquidity)) = result else {
                    return Err(LadderError::Configuration(format!("position {id} not found")));
                };
                let ticks = DecodedTicks {
                    tick_lower,
                    tick_upper,
                    confidence: DecodeConfidence::Strong,
                    layout: "explicit",
                };
                Ok(PositionDetails {
                    token_id: *id,
                    key,
                    info: DecodedPositionInfo::new(PoolRef::Full(key.id()), ticks, liquidity),
                })
            })
            .collect())
    }
}

/// Off-chain source of the position NFTs an owner holds
#[async_trait]
pub trait PositionIndexer: Send + Sync {
    async fn owned_positions(&self, owner: Address) -> anyhow::Result<Vec<U256>>;
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NftTransfer {
    #[serde(rename = "tokenID")]
    token_id: String,
    from: String,
    to: String,
}

/// Etherscan-compatible `tokennfttx` client
pub struct ExplorerIndexer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    position_manager: Address,
}

impl ExplorerIndexer {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, position_manager: Address) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create explorer HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            position_manager,
        })
    }
}

/// Ids whose most recent transfer (in ascending order) went to `owner`
fn held_after_replay(transfers: &[NftTransfer], owner: Address) -> anyhow::Result<Vec<U256>> {
    let mut last: Vec<(U256, bool)> = Vec::new();
    for transfer in transfers {
        let id = U256::from_dec_str(&transfer.token_id).context("invalid tokenID in explorer response")?;
        let to: Address = transfer.to.parse().context("invalid 'to' in explorer response")?;
        let from: Address = transfer.from.parse().context("invalid 'from' in explorer response")?;
        let incoming = if to == owner {
            true
        } else if from == owner {
            false
        } else {
            continue;
        };
        match last.iter_mut().find(|(seen, _)| *seen == id) {
            Some(entry) => entry.1 = incoming,
            None => last.push((id, incoming)),
        }
    }
    Ok(last.into_iter().filter(|(_, held)| *held).map(|(id, _)| id).collect())
}

#[async_trait]
impl PositionIndexer for ExplorerIndexer {
    async fn owned_positions(&self, owner: Address) -> anyhow::Result<Vec<U256>> {
        let mut query = vec![
            ("module", "account".to_string()),
            ("action", "tokennfttx".to_string()),
            ("contractaddress", format!("{:?}", self.position_manager)),
            ("address", format!("{owner:?}")),
            ("page", "1".to_string()),
            ("offset", "1000".to_string()),
            ("sort", "asc".to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        let response: ExplorerResponse = self
            .client
            .get(&self.api_url)
            .query(&query)
            .send()
            .await
            .context("explorer request failed")?
            .json()
            .await
            .context("explorer response is not JSON")?;

        if response.status != "1" {
            // "No transactions found" is reported as status 0 with an empty result
            if response.result.as_array().map_or(false, |r| r.is_empty()) {
                return Ok(Vec::new());
            }
            anyhow::bail!("explorer returned status {}: {}", response.status, response.message);
        }
        let transfers: Vec<NftTransfer> =
            serde_json::from_value(response.result).context("unexpected explorer result shape")?;
        held_after_replay(&transfers, owner)
    }
}

/// Block window scanned when no faster enumeration works
#[derive(Debug, Clone, Copy)]
pub struct ScanWindow {
    pub window_blocks: u64,
    pub chunk_blocks: u64,
    pub mini_chunk_blocks: u64,
}

pub struct PositionEnumerator {
    chain: Arc<dyn ChainClient>,
    aggregator: Arc<BatchCallAggregator>,
    position_manager: Address,
    indexer: Option<Arc<dyn PositionIndexer>>,
    scan: ScanWindow,
}

impl PositionEnumerator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        aggregator: Arc<BatchCallAggregator>,
        position_manager: Address,
        indexer: Option<Arc<dyn PositionIndexer>>,
        scan: ScanWindow,
    ) -> Self {
        Self {
            chain,
            aggregator,
            position_manager,
            indexer,
            scan,
        }
    }

    /// Position NFT ids currently held by `owner`
    pub async fn enumerate_owned(&self, owner: Address) -> Result<Vec<U256>, LadderError> {
        let balance = self
            .aggregator
            .execute(vec![BatchCall::new(
                self.position_manager,
                encode_balance_of(owner),
                "balanceOf",
                decode_uint,
            )])
            .await?
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_default();
        if balance.is_zero() {
            log_search!("{:?} holds no positions", owner);
            return Ok(Vec::new());
        }
        let expected = balance.min(U256::from(u32::MAX)).as_u64();

        if let Some(ids) = self.by_index(owner, expected).await? {
            log_search!("found {} position(s) via tokenOfOwnerByIndex", ids.len());
            return Ok(ids);
        }

        if let Some(indexer) = &self.indexer {
            match indexer.owned_positions(owner).await {
                Ok(ids) if !ids.is_empty() => {
                    log_search!("found {} position(s) via explorer", ids.len());
                    return Ok(ids);
                }
                Ok(_) => debug!("explorer knows no positions, scanning logs"),
                Err(e) => warn!(error = %e, "explorer lookup failed, scanning logs"),
            }
        }

        let candidates = self.scan_transfers(owner).await?;
        let owned = self.verify_owner(owner, candidates).await?;
        if (owned.len() as u64) < expected {
            warn!(
                found = owned.len(),
                expected, "some positions were received before the scan window"
            );
        }
        log_search!("found {} position(s) via log scan", owned.len());
        Ok(owned)
    }

    async fn by_index(&self, owner: Address, count: u64) -> Result<Option<Vec<U256>>, LadderError> {
        let calls = (0..count)
            .map(|index| {
                BatchCall::new(
                    self.position_manager,
                    encode_token_of_owner_by_index(owner, index),
                    format!("tokenOfOwnerByIndex({index})"),
                    decode_token_id,
                )
                .optional()
            })
            .collect();
        let results = self.aggregator.execute(calls).await?;
        if results.iter().any(Option::is_none) {
            debug!("position manager is not enumerable");
            return Ok(None);
        }
        Ok(Some(results.into_iter().flatten().collect()))
    }

    async fn scan_transfers(&self, owner: Address) -> Result<Vec<U256>, LadderError> {
        let head = self.chain.block_number().await?;
        let start = head.saturating_sub(self.scan.window_blocks);
        let mut ids: Vec<U256> = Vec::new();

        let mut chunk_start = start;
        while chunk_start <= head {
            let chunk_end = (chunk_start + self.scan.chunk_blocks - 1).min(head);
            match self.transfers_to(owner, chunk_start, chunk_end).await {
                Ok(found) => merge(&mut ids, found),
                Err(e) if e.is_range_limit() => {
                    debug!(chunk_start, chunk_end, "range rejected, retrying in smaller chunks");
                    let mut mini_start = chunk_start;
                    while mini_start <= chunk_end {
                        let mini_end = (mini_start + self.scan.mini_chunk_blocks - 1).min(chunk_end);
                        match self.transfers_to(owner, mini_start, mini_end).await {
                            Ok(found) => merge(&mut ids, found),
                            Err(e) => warn!(mini_start, mini_end, error = %e, "log query failed, skipping range"),
                        }
                        mini_start = mini_end + 1;
                    }
                }
                Err(e) => warn!(chunk_start, chunk_end, error = %e, "log query failed, skipping range"),
            }
            chunk_start = chunk_end + 1;
        }
        Ok(ids)
    }

    async fn transfers_to(&self, owner: Address, from: u64, to: u64) -> Result<Vec<U256>, ChainError> {
        let filter = Filter::new()
            .address(self.position_manager)
            .topic0(ERC721_TRANSFER)
            .topic2(H256::from(owner))
            .from_block(from)
            .to_block(to);
        let logs = self.chain.logs(&filter).await?;
        Ok(logs
            .iter()
            .filter_map(|log| dex::TransferLog::new(log.address, &log.topics).decode())
            .map(|(_, _, id)| id)
            .collect())
    }

    async fn verify_owner(&self, owner: Address, candidates: Vec<U256>) -> Result<Vec<U256>, LadderError> {
        let calls = candidates
            .iter()
            .map(|id| {
                BatchCall::new(
                    self.position_manager,
                    encode_owner_of(*id),
                    format!("ownerOf({id})"),
                    decode_owner_of,
                )
                .optional()
            })
            .collect();
        let owners = self.aggregator.execute(calls).await?;
        Ok(candidates
            .into_iter()
            .zip(owners)
            .filter(|(_, holder)| *holder == Some(owner))
            .map(|(id, _)| id)
            .collect())
    }
}

fn merge(ids: &mut Vec<U256>, found: Vec<U256>) {
    for id in found {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(id: &str, from: &str, to: &str) -> NftTransfer {
        NftTransfer {
            token_id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn test_explorer_replay_keeps_current_holdings() {
        let owner: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let zero = "0x0000000000000000000000000000000000000000";
        let me = "0x00000000000000000000000000000000000000aa";
        let other = "0x00000000000000000000000000000000000000bb";

        let transfers = vec![
            transfer("1", zero, me),
            transfer("2", zero, me),
            transfer("1", me, other),
            transfer("3", other, me),
        ];
        let held = held_after_replay(&transfers, owner).unwrap();
        assert_eq!(held, vec![U256::from(2u64), U256::from(3u64)]);
    }

    #[test]
    fn test_explorer_payload_parses() {
        let body = r#"{"status":"1","message":"OK","result":[
            {"tokenID":"42","from":"0x0000000000000000000000000000000000000000","to":"0x00000000000000000000000000000000000000aa","hash":"0x01"}
        ]}"#;
        let response: ExplorerResponse = serde_json::from_str(body).unwrap();
        let transfers: Vec<NftTransfer> = serde_json::from_value(response.result).unwrap();
        assert_eq!(transfers[0].token_id, "42");
    }
}
