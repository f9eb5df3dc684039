//! ERC20 and Permit2 approval ABIs
//!
//! Spending by the position manager is a two-hop grant: the token approves
//! Permit2, and Permit2 in turn holds a per-(owner, token, spender) allowance
//! with an expiration timestamp.

use super::{encode_call, function, param, token_uint, DecodingError};
use ethabi::{Function, ParamType, StateMutability, Token};
use ethereum_types::{Address, U256};
use once_cell::sync::Lazy;

/// Largest amount a Permit2 allowance can hold (uint160)
pub fn max_uint160() -> U256 {
    (U256::one() << 160) - 1
}

pub static BALANCE_OF: Lazy<Function> = Lazy::new(|| {
    function(
        "balanceOf",
        vec![param("owner", ParamType::Address)],
        vec![param("", ParamType::Uint(256))],
        StateMutability::View,
    )
});

pub static ALLOWANCE: Lazy<Function> = Lazy::new(|| {
    function(
        "allowance",
        vec![
            param("owner", ParamType::Address),
            param("spender", ParamType::Address),
        ],
        vec![param("", ParamType::Uint(256))],
        StateMutability::View,
    )
});

pub static APPROVE: Lazy<Function> = Lazy::new(|| {
    function(
        "approve",
        vec![
            param("spender", ParamType::Address),
            param("amount", ParamType::Uint(256)),
        ],
        vec![param("", ParamType::Bool)],
        StateMutability::NonPayable,
    )
});

pub static DECIMALS: Lazy<Function> = Lazy::new(|| {
    function(
        "decimals",
        vec![],
        vec![param("", ParamType::Uint(8))],
        StateMutability::View,
    )
});

/// `Permit2.approve(address token, address spender, uint160 amount, uint48 expiration)`
pub static PERMIT2_APPROVE: Lazy<Function> = Lazy::new(|| {
    function(
        "approve",
        vec![
            param("token", ParamType::Address),
            param("spender", ParamType::Address),
            param("amount", ParamType::Uint(160)),
            param("expiration", ParamType::Uint(48)),
        ],
        vec![],
        StateMutability::NonPayable,
    )
});

/// `Permit2.allowance(owner, token, spender) -> (uint160, uint48, uint48)`
pub static PERMIT2_ALLOWANCE: Lazy<Function> = Lazy::new(|| {
    function(
        "allowance",
        vec![
            param("owner", ParamType::Address),
            param("token", ParamType::Address),
            param("spender", ParamType::Address),
        ],
        vec![
            param("amount", ParamType::Uint(160)),
            param("expiration", ParamType::Uint(48)),
            param("nonce", ParamType::Uint(48)),
        ],
        StateMutability::View,
    )
});

/// Permit2 grant as read back from chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApprovalRecord {
    pub amount: U256,
    /// Unix seconds; zero means never granted
    pub expiration: u64,
    pub nonce: u64,
}

impl ApprovalRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration <= now
    }

    pub fn covers(&self, required: U256, now: u64) -> bool {
        !self.is_expired(now) && self.amount >= required
    }
}

pub fn encode_balance_of(owner: Address) -> Vec<u8> {
    encode_call(&BALANCE_OF, &[Token::Address(owner)])
}

pub fn encode_allowance(owner: Address, spender: Address) -> Vec<u8> {
    encode_call(&ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

pub fn encode_approve(spender: Address, amount: U256) -> Vec<u8> {
    encode_call(&APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

pub fn encode_decimals() -> Vec<u8> {
    encode_call(&DECIMALS, &[])
}

pub fn encode_permit2_approve(token: Address, spender: Address, amount: U256, expiration: u64) -> Vec<u8> {
    encode_call(
        &PERMIT2_APPROVE,
        &[
            Token::Address(token),
            Token::Address(spender),
            Token::Uint(amount.min(max_uint160())),
            Token::Uint(U256::from(expiration & 0xffff_ffff_ffff)),
        ],
    )
}

pub fn encode_permit2_allowance(owner: Address, token: Address, spender: Address) -> Vec<u8> {
    encode_call(
        &PERMIT2_ALLOWANCE,
        &[
            Token::Address(owner),
            Token::Address(token),
            Token::Address(spender),
        ],
    )
}

/// Single uint256 return (balanceOf, allowance)
pub fn decode_uint(data: &[u8]) -> Result<U256, DecodingError> {
    let tokens = BALANCE_OF.decode_output(data)?;
    tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("uint256".to_string()))
        .and_then(|t| token_uint(t, "uint256"))
}

pub fn decode_decimals(data: &[u8]) -> Result<u8, DecodingError> {
    let tokens = DECIMALS.decode_output(data)?;
    let value = tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("decimals".to_string()))
        .and_then(|t| token_uint(t, "decimals"))?;
    if value > U256::from(u8::MAX) {
        return Err(DecodingError::ValueOverflow {
            value: value.to_string(),
        });
    }
    Ok(value.low_u32() as u8)
}

pub fn decode_permit2_allowance(data: &[u8]) -> Result<ApprovalRecord, DecodingError> {
    let tokens = PERMIT2_ALLOWANCE.decode_output(data)?;
    if tokens.len() != 3 {
        return Err(DecodingError::UnexpectedShape {
            expected: 3,
            got: tokens.len(),
        });
    }
    Ok(ApprovalRecord {
        amount: token_uint(&tokens[0], "amount")?,
        expiration: token_uint(&tokens[1], "expiration")?.low_u64(),
        nonce: token_uint(&tokens[2], "nonce")?.low_u64(),
    })
}
