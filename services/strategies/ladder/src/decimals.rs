//! Token decimals cache
//!
//! Pre-seeded from the known-token table; unknown tokens are filled with one
//! batched `decimals()` read. Tokens that do not answer fall back to 18
//! without being cached so a later run can still learn the real value.

use crate::errors::LadderError;
use crate::multicall::{BatchCall, BatchCallAggregator};
use dashmap::DashMap;
use dex::abi::erc20::{decode_decimals, encode_decimals};
use ethers::types::Address;
use ladder_config::tokens::KNOWN_DECIMALS;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::warn;

pub const DEFAULT_DECIMALS: u8 = 18;

pub struct DecimalsCache {
    entries: DashMap<Address, u8>,
    seeded: HashSet<Address>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            seeded: HashSet::new(),
        }
    }

    /// Cache pre-seeded with the known-token table
    pub fn with_known() -> Self {
        let mut cache = Self::new();
        for (address, decimals) in KNOWN_DECIMALS {
            if let Ok(parsed) = address.parse::<Address>() {
                cache.entries.insert(parsed, *decimals);
                cache.seeded.insert(parsed);
            }
        }
        cache
    }

    pub fn get(&self, token: &Address) -> Option<u8> {
        self.entries.get(token).map(|entry| *entry)
    }

    pub fn insert(&self, token: Address, decimals: u8) {
        self.entries.insert(token, decimals);
    }

    /// Drop learned entries, keeping the seeded ones
    pub fn clear(&self) {
        self.entries.retain(|token, _| self.seeded.contains(token));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decimals for every token, reading unknown ones in a single batch
    pub async fn resolve(
        &self,
        aggregator: &BatchCallAggregator,
        tokens: &[Address],
    ) -> Result<HashMap<Address, u8>, LadderError> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        for token in tokens {
            match self.get(token) {
                Some(decimals) => {
                    resolved.insert(*token, decimals);
                }
                None if !missing.contains(token) => missing.push(*token),
                None => {}
            }
        }

        if missing.is_empty() {
            return Ok(resolved);
        }

        let calls = missing
            .iter()
            .map(|token| BatchCall::new(*token, encode_decimals(), "decimals", decode_decimals).optional())
            .collect();
        let results = aggregator.execute(calls).await?;

        for (token, result) in missing.into_iter().zip(results) {
            match result {
                Some(decimals) => {
                    self.insert(token, decimals);
                    resolved.insert(token, decimals);
                }
                None => {
                    warn!(?token, "decimals() unavailable, assuming {}", DEFAULT_DECIMALS);
                    resolved.insert(token, DEFAULT_DECIMALS);
                }
            }
        }
        Ok(resolved)
    }
}

impl Default for DecimalsCache {
    fn default() -> Self {
        Self::with_known()
    }
}
