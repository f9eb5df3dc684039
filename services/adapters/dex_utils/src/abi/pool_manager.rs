//! Pool state reads
//!
//! Uniswap exposes these through a StateView lens contract; the PancakeSwap
//! CL pool manager answers them directly. The ABI is the same either way.

use super::{encode_call, function, param, token_i32, token_uint, DecodingError};
use ethabi::{Function, ParamType, StateMutability, Token};
use ethereum_types::U256;
use ladder_amm::PoolId;
use once_cell::sync::Lazy;

pub static GET_SLOT0: Lazy<Function> = Lazy::new(|| {
    function(
        "getSlot0",
        vec![param("id", ParamType::FixedBytes(32))],
        vec![
            param("sqrtPriceX96", ParamType::Uint(160)),
            param("tick", ParamType::Int(24)),
            param("protocolFee", ParamType::Uint(24)),
            param("lpFee", ParamType::Uint(24)),
        ],
        StateMutability::View,
    )
});

pub static GET_LIQUIDITY: Lazy<Function> = Lazy::new(|| {
    function(
        "getLiquidity",
        vec![param("id", ParamType::FixedBytes(32))],
        vec![param("liquidity", ParamType::Uint(128))],
        StateMutability::View,
    )
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub protocol_fee: u32,
    pub lp_fee: u32,
}

impl Slot0 {
    /// A pool that was never initialized reports a zero price
    pub fn is_initialized(&self) -> bool {
        !self.sqrt_price_x96.is_zero()
    }
}

fn pool_id_token(id: &PoolId) -> Token {
    Token::FixedBytes(id.as_bytes().to_vec())
}

pub fn encode_get_slot0(id: &PoolId) -> Vec<u8> {
    encode_call(&GET_SLOT0, &[pool_id_token(id)])
}

pub fn encode_get_liquidity(id: &PoolId) -> Vec<u8> {
    encode_call(&GET_LIQUIDITY, &[pool_id_token(id)])
}

pub fn decode_slot0(data: &[u8]) -> Result<Slot0, DecodingError> {
    let tokens = GET_SLOT0.decode_output(data)?;
    if tokens.len() != 4 {
        return Err(DecodingError::UnexpectedShape {
            expected: 4,
            got: tokens.len(),
        });
    }
    Ok(Slot0 {
        sqrt_price_x96: token_uint(&tokens[0], "sqrtPriceX96")?,
        tick: token_i32(&tokens[1], "tick")?,
        protocol_fee: token_uint(&tokens[2], "protocolFee")?.low_u32(),
        lp_fee: token_uint(&tokens[3], "lpFee")?.low_u32(),
    })
}

pub fn decode_liquidity(data: &[u8]) -> Result<u128, DecodingError> {
    let tokens = GET_LIQUIDITY.decode_output(data)?;
    tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("liquidity".to_string()))
        .and_then(|t| super::token_u128(t, "liquidity"))
}

/// Encode a slot0 response. Used by test doubles.
pub fn encode_slot0(slot0: &Slot0) -> Vec<u8> {
    ethabi::encode(&[
        Token::Uint(slot0.sqrt_price_x96),
        Token::Int(ladder_amm::pool_key::signed_word(slot0.tick as i64)),
        Token::Uint(U256::from(slot0.protocol_fee)),
        Token::Uint(U256::from(slot0.lp_fee)),
    ])
}
