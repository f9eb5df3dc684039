//! ABI definitions and decoding for singleton pool-manager protocols
//!
//! This module provides:
//! - The tagged action-batch codec consumed by the position manager's unlock call
//! - PositionInfo disambiguation across incompatible on-chain encodings
//! - Canonical function ABIs for the position manager, pool state reads,
//!   ERC20 / Permit2 approvals and Multicall3
//! - Transfer event decoding for minted and owned position ids
//!
//! # Supported Protocols
//! - Uniswap V4
//! - PancakeSwap Infinity (concentrated liquidity)

pub mod actions;
pub mod erc20;
pub mod events;
pub mod multicall;
pub mod pool_manager;
pub mod position_info;
pub mod position_manager;

use ethabi::{Function, Param, ParamType, StateMutability, Token};
use ethereum_types::{Address, U256};
use ladder_amm::pool_key::word_to_signed;
use ladder_amm::{PoolKey, PoolKeyError, PoolVariant};

// Re-export main components
pub use actions::{Action, ActionError, ActionPayload, ClosePosition, EncodedAction, MintParams};
pub use erc20::ApprovalRecord;
pub use events::{minted_token_ids, transfer_event, DecodingError, TransferLog};
pub use multicall::{Call3, CallResult};
pub use pool_manager::Slot0;
pub use position_info::{
    decode_position_info, DecodeConfidence, DecodedPositionInfo, DecodedTicks, InfoField,
    PoolRef, RawPositionInfo, LAYOUT_CANDIDATES,
};

/// Which pool-key tuple a contract family speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `(address,address,uint24,int24,address)`
    Standard,
    /// `(address,address,address,address,uint24,bytes32)`
    Alternate,
}

impl KeyLayout {
    pub fn of(variant: &PoolVariant) -> Self {
        match variant {
            PoolVariant::Standard => KeyLayout::Standard,
            PoolVariant::Alternate { .. } => KeyLayout::Alternate,
        }
    }

    pub fn param_type(self) -> ParamType {
        match self {
            KeyLayout::Standard => ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::Int(24),
                ParamType::Address,
            ]),
            KeyLayout::Alternate => ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(24),
                ParamType::FixedBytes(32),
            ]),
        }
    }

    /// Number of 32-byte words the tuple occupies inline
    pub fn words(self) -> usize {
        match self {
            KeyLayout::Standard => 5,
            KeyLayout::Alternate => 6,
        }
    }
}

pub(crate) fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

#[allow(deprecated)]
pub(crate) fn function(
    name: &str,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs,
        outputs,
        constant: None,
        state_mutability,
    }
}

/// Calldata for a static ABI. Every caller builds its tokens from typed
/// arguments that mirror the declared inputs, so a mismatch is a programming
/// error in this module rather than a runtime condition.
pub(crate) fn encode_call(function: &Function, tokens: &[Token]) -> Vec<u8> {
    function
        .encode_input(tokens)
        .unwrap_or_else(|e| panic!("{} called with tokens that do not match its inputs: {e}", function.name))
}

pub(crate) fn token_address(token: &Token, field: &str) -> Result<Address, DecodingError> {
    token
        .clone()
        .into_address()
        .ok_or_else(|| DecodingError::MissingField(field.to_string()))
}

pub(crate) fn token_uint(token: &Token, field: &str) -> Result<U256, DecodingError> {
    token
        .clone()
        .into_uint()
        .ok_or_else(|| DecodingError::MissingField(field.to_string()))
}

pub(crate) fn token_u128(token: &Token, field: &str) -> Result<u128, DecodingError> {
    let value = token_uint(token, field)?;
    if value > U256::from(u128::MAX) {
        return Err(DecodingError::ValueOverflow {
            value: value.to_string(),
        });
    }
    Ok(value.as_u128())
}

pub(crate) fn token_i32(token: &Token, field: &str) -> Result<i32, DecodingError> {
    let word = token
        .clone()
        .into_int()
        .ok_or_else(|| DecodingError::MissingField(field.to_string()))?;
    word_to_signed(word)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| DecodingError::ValueOverflow {
            value: word.to_string(),
        })
}

/// Rebuild a [`PoolKey`] from a decoded key tuple
pub fn pool_key_from_token(token: &Token, layout: KeyLayout) -> Result<PoolKey, DecodingError> {
    let fields = token
        .clone()
        .into_tuple()
        .ok_or_else(|| DecodingError::MissingField("poolKey".to_string()))?;
    if fields.len() != layout.words() {
        return Err(DecodingError::UnexpectedShape {
            expected: layout.words(),
            got: fields.len(),
        });
    }

    let key = match layout {
        KeyLayout::Standard => {
            let fee = token_uint(&fields[2], "fee")?.low_u32();
            PoolKey::new(
                token_address(&fields[0], "currency0")?,
                token_address(&fields[1], "currency1")?,
                fee,
                token_i32(&fields[3], "tickSpacing")?,
                token_address(&fields[4], "hooks")?,
                PoolVariant::Standard,
            )
        }
        KeyLayout::Alternate => {
            let parameters = fields[5]
                .clone()
                .into_fixed_bytes()
                .ok_or_else(|| DecodingError::MissingField("parameters".to_string()))?;
            let spacing = word_to_signed(U256::from_big_endian(&parameters))
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| DecodingError::ValueOverflow {
                    value: format!("0x{}", hex_string(&parameters)),
                })?;
            PoolKey::new(
                token_address(&fields[0], "currency0")?,
                token_address(&fields[1], "currency1")?,
                token_uint(&fields[4], "fee")?.low_u32(),
                spacing,
                token_address(&fields[2], "hooks")?,
                PoolVariant::Alternate {
                    pool_manager: token_address(&fields[3], "poolManager")?,
                },
            )
        }
    };
    key.map_err(|e: PoolKeyError| DecodingError::AbiParsingError(e.to_string()))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
