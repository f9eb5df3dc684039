//! Pool keys and deterministic pool identifiers
//!
//! In the singleton pool-manager design a pool has no contract address of its
//! own. It is named by the keccak256 hash of its ABI-encoded key, so the key
//! layout must match the deployed manager byte for byte.
//!
//! Two layouts are supported:
//!
//! - **Standard** (Uniswap V4): `(currency0, currency1, fee, tickSpacing, hooks)`
//! - **Alternate** (PancakeSwap Infinity CL): `(currency0, currency1, hooks,
//!   poolManager, fee, parameters)` where `parameters` carries the tick spacing
//!   sign-extended to a 32-byte big-endian word
//!
//! Currencies are always sorted ascending before hashing. Hashing the reversed
//! order yields a different identifier that names no pool.

use ethabi::Token;
use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Fee denominator: fees are expressed in parts per million
pub const MAX_FEE_PARTS: u32 = 1_000_000;

/// Largest tick spacing an int24-bounded manager accepts
pub const MAX_TICK_SPACING: i32 = 32_767;

/// Length of the truncated pool id carried inside packed position info
pub const TRUNCATED_POOL_ID_LEN: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolKeyError {
    #[error("currencies must differ, both were {0:?}")]
    IdenticalCurrencies(Address),

    #[error("fee {0} exceeds 1000000 parts per million")]
    FeeOutOfRange(u32),

    #[error("tick spacing {0} outside 1..=32767")]
    TickSpacingOutOfRange(i32),

    #[error("invalid pool id: {0}")]
    InvalidPoolId(String),
}

/// Which key layout the target pool manager hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolVariant {
    /// Five-field key hashed as-is
    Standard,
    /// Reordered key that includes the deploying manager's address
    Alternate { pool_manager: Address },
}

/// 32-byte pool identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub [u8; 32]);

impl PoolId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_h256(&self) -> H256 {
        H256::from(self.0)
    }

    /// Leading bytes as stored in the packed position-info word
    pub fn truncated(&self) -> [u8; TRUNCATED_POOL_ID_LEN] {
        let mut out = [0u8; TRUNCATED_POOL_ID_LEN];
        out.copy_from_slice(&self.0[..TRUNCATED_POOL_ID_LEN]);
        out
    }

    pub fn matches_truncated(&self, truncated: &[u8; TRUNCATED_POOL_ID_LEN]) -> bool {
        &self.0[..TRUNCATED_POOL_ID_LEN] == truncated.as_slice()
    }
}

impl From<H256> for PoolId {
    fn from(value: H256) -> Self {
        PoolId(value.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({self})")
    }
}

impl FromStr for PoolId {
    type Err = PoolKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(digits).map_err(|e| PoolKeyError::InvalidPoolId(format!("{s}: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PoolKeyError::InvalidPoolId(format!("{s}: expected 32 bytes")))?;
        Ok(PoolId(array))
    }
}

/// Canonical pool key with currencies sorted ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    /// Fee in parts per million
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
    pub variant: PoolVariant,
}

impl PoolKey {
    /// Build a key from currencies in any order
    pub fn new(
        token_a: Address,
        token_b: Address,
        fee: u32,
        tick_spacing: i32,
        hooks: Address,
        variant: PoolVariant,
    ) -> Result<Self, PoolKeyError> {
        if token_a == token_b {
            return Err(PoolKeyError::IdenticalCurrencies(token_a));
        }
        if fee > MAX_FEE_PARTS {
            return Err(PoolKeyError::FeeOutOfRange(fee));
        }
        if !(1..=MAX_TICK_SPACING).contains(&tick_spacing) {
            return Err(PoolKeyError::TickSpacingOutOfRange(tick_spacing));
        }

        let (currency0, currency1) = sort_currencies(token_a, token_b);
        Ok(Self {
            currency0,
            currency1,
            fee,
            tick_spacing,
            hooks,
            variant,
        })
    }

    /// Same key with a different fee and tick spacing. Inputs are not revalidated.
    pub fn with_params(&self, fee: u32, tick_spacing: i32) -> Self {
        Self {
            fee,
            tick_spacing,
            ..*self
        }
    }

    pub fn contains(&self, currency: Address) -> bool {
        self.currency0 == currency || self.currency1 == currency
    }

    /// ABI tuple fields in the order the variant's manager expects
    pub fn abi_fields(&self) -> Vec<Token> {
        match self.variant {
            PoolVariant::Standard => vec![
                Token::Address(self.currency0),
                Token::Address(self.currency1),
                Token::Uint(U256::from(self.fee)),
                Token::Int(signed_word(self.tick_spacing as i64)),
                Token::Address(self.hooks),
            ],
            PoolVariant::Alternate { pool_manager } => {
                let mut parameters = [0u8; 32];
                signed_word(self.tick_spacing as i64).to_big_endian(&mut parameters);
                vec![
                    Token::Address(self.currency0),
                    Token::Address(self.currency1),
                    Token::Address(self.hooks),
                    Token::Address(pool_manager),
                    Token::Uint(U256::from(self.fee)),
                    Token::FixedBytes(parameters.to_vec()),
                ]
            }
        }
    }

    pub fn to_token(&self) -> Token {
        Token::Tuple(self.abi_fields())
    }

    /// keccak256 of the ABI-encoded key
    pub fn id(&self) -> PoolId {
        let encoded = ethabi::encode(&self.abi_fields());
        PoolId(keccak256(&encoded))
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?} fee={} spacing={} hooks={:?}",
            self.currency0, self.currency1, self.fee, self.tick_spacing, self.hooks
        )
    }
}

/// Derive a pool id from unsorted inputs
pub fn compute_pool_id(
    token_a: Address,
    token_b: Address,
    fee: u32,
    tick_spacing: i32,
    hooks: Address,
    variant: PoolVariant,
) -> Result<PoolId, PoolKeyError> {
    PoolKey::new(token_a, token_b, fee, tick_spacing, hooks, variant).map(|key| key.id())
}

/// Order two currencies ascending by address value
pub fn sort_currencies(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Two's-complement 256-bit representation of a signed value
pub fn signed_word(value: i64) -> U256 {
    if value >= 0 {
        U256::from(value as u64)
    } else {
        // -(v) - 1 is non-negative for every i64, so this never overflows
        !U256::from((-(value + 1)) as u64)
    }
}

/// Inverse of [`signed_word`]; `None` when the word does not fit an i64
pub fn word_to_signed(word: U256) -> Option<i64> {
    if word.bit(255) {
        let magnitude_minus_one = !word;
        if magnitude_minus_one > U256::from(i64::MAX as u64) {
            return None;
        }
        Some(-(magnitude_minus_one.as_u64() as i64) - 1)
    } else {
        if word > U256::from(i64::MAX as u64) {
            return None;
        }
        Some(word.as_u64() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        bytes[0] = 0x11;
        Address::from(bytes)
    }

    #[test]
    fn test_currencies_sorted_on_construction() {
        let key = PoolKey::new(addr(9), addr(2), 3000, 60, Address::zero(), PoolVariant::Standard)
            .unwrap();
        assert_eq!(key.currency0, addr(2));
        assert_eq!(key.currency1, addr(9));
    }

    #[test]
    fn test_standard_id_matches_manual_encoding() {
        let key = PoolKey::new(addr(1), addr(2), 3000, 60, Address::zero(), PoolVariant::Standard)
            .unwrap();

        let mut manual = Vec::new();
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr(1).as_bytes());
        manual.extend_from_slice(&word);
        word[12..].copy_from_slice(addr(2).as_bytes());
        manual.extend_from_slice(&word);
        let mut fee = [0u8; 32];
        U256::from(3000u32).to_big_endian(&mut fee);
        manual.extend_from_slice(&fee);
        let mut spacing = [0u8; 32];
        U256::from(60u32).to_big_endian(&mut spacing);
        manual.extend_from_slice(&spacing);
        manual.extend_from_slice(&[0u8; 32]);

        assert_eq!(key.id(), PoolId(keccak256(&manual)));
    }

    #[test]
    fn test_reversed_order_hash_differs() {
        let key = PoolKey::new(addr(1), addr(2), 500, 10, Address::zero(), PoolVariant::Standard)
            .unwrap();
        let reversed = ethabi::encode(&[
            Token::Address(key.currency1),
            Token::Address(key.currency0),
            Token::Uint(U256::from(500u32)),
            Token::Int(signed_word(10)),
            Token::Address(Address::zero()),
        ]);
        assert_ne!(key.id(), PoolId(keccak256(&reversed)));
    }

    #[test]
    fn test_alternate_variant_differs_and_depends_on_manager() {
        let standard =
            compute_pool_id(addr(1), addr(2), 2500, 50, Address::zero(), PoolVariant::Standard)
                .unwrap();
        let alt_a = compute_pool_id(
            addr(1),
            addr(2),
            2500,
            50,
            Address::zero(),
            PoolVariant::Alternate { pool_manager: addr(7) },
        )
        .unwrap();
        let alt_b = compute_pool_id(
            addr(1),
            addr(2),
            2500,
            50,
            Address::zero(),
            PoolVariant::Alternate { pool_manager: addr(8) },
        )
        .unwrap();

        assert_ne!(standard, alt_a);
        assert_ne!(alt_a, alt_b);
    }

    #[test]
    fn test_alternate_parameters_word() {
        let key = PoolKey::new(
            addr(1),
            addr(2),
            100,
            200,
            Address::zero(),
            PoolVariant::Alternate { pool_manager: addr(3) },
        )
        .unwrap();
        match &key.abi_fields()[5] {
            Token::FixedBytes(bytes) => {
                assert_eq!(bytes.len(), 32);
                assert_eq!(bytes[31], 200);
                assert!(bytes[..31].iter().all(|b| *b == 0));
            }
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_key_validation() {
        assert_eq!(
            PoolKey::new(addr(1), addr(1), 3000, 60, Address::zero(), PoolVariant::Standard),
            Err(PoolKeyError::IdenticalCurrencies(addr(1)))
        );
        assert_eq!(
            PoolKey::new(addr(1), addr(2), 1_000_001, 60, Address::zero(), PoolVariant::Standard),
            Err(PoolKeyError::FeeOutOfRange(1_000_001))
        );
        assert_eq!(
            PoolKey::new(addr(1), addr(2), 3000, 0, Address::zero(), PoolVariant::Standard),
            Err(PoolKeyError::TickSpacingOutOfRange(0))
        );
    }

    #[test]
    fn test_pool_id_parse_and_display() {
        let id = compute_pool_id(addr(1), addr(2), 3000, 60, Address::zero(), PoolVariant::Standard)
            .unwrap();
        let text = id.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<PoolId>().unwrap(), id);
        assert_eq!(text.trim_start_matches("0x").parse::<PoolId>().unwrap(), id);
        assert!("0x1234".parse::<PoolId>().is_err());
        assert!(id.matches_truncated(&id.truncated()));
    }

    #[test]
    fn test_signed_word_round_trip() {
        for value in [-887_272i64, -1, 0, 1, 60, 887_272, i64::MIN, i64::MAX] {
            assert_eq!(word_to_signed(signed_word(value)), Some(value));
        }
        assert_eq!(signed_word(-1), U256::MAX);
        assert_eq!(word_to_signed(U256::from(u64::MAX)), None);
    }
}
