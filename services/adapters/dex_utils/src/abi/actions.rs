//! Action-batch codec for the position manager's unlock entry point
//!
//! A payload is an ordered list of `(tag, params)` pairs serialized as
//! `abi.encode(bytes actions, bytes[] params)`: the tags packed one byte each,
//! the parameter blobs in a parallel array. The manager executes the whole
//! list atomically inside a single unlock.
//!
//! Settlement is netted across the call. A batch of N mints therefore ends in
//! exactly one SETTLE_PAIR, and a batch of closes ends in one TAKE_PAIR per
//! distinct currency pair rather than one per position.

use super::events::DecodingError;
use ethabi::{ParamType, Token};
use ethereum_types::{Address, U256};
use ladder_amm::pool_key::signed_word;
use ladder_amm::{sort_currencies, PoolKey};
use std::fmt;

/// Action tags understood by the mint/close lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    DecreaseLiquidity = 0x01,
    MintPosition = 0x02,
    BurnPosition = 0x03,
    SettlePair = 0x0d,
    TakePair = 0x11,
}

impl Action {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Action::DecreaseLiquidity),
            0x02 => Some(Action::MintPosition),
            0x03 => Some(Action::BurnPosition),
            0x0d => Some(Action::SettlePair),
            0x11 => Some(Action::TakePair),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::DecreaseLiquidity => "DECREASE_LIQUIDITY",
            Action::MintPosition => "MINT_POSITION",
            Action::BurnPosition => "BURN_POSITION",
            Action::SettlePair => "SETTLE_PAIR",
            Action::TakePair => "TAKE_PAIR",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("cannot build an empty {0} batch")]
    EmptyBatch(&'static str),

    #[error("mint batch spans more than one currency pair: {0:?}/{1:?}")]
    MixedPairs(Address, Address),

    #[error("tick range [{0}, {1}] is not ordered")]
    UnorderedTicks(i32, i32),
}

/// One encoded action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAction {
    pub action: Action,
    pub params: Vec<u8>,
}

/// Ordered action list consumed by one unlock call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPayload {
    actions: Vec<EncodedAction>,
}

impl ActionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action, params: Vec<u8>) {
        self.actions.push(EncodedAction { action, params });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[EncodedAction] {
        &self.actions
    }

    pub fn tags(&self) -> Vec<u8> {
        self.actions.iter().map(|a| a.action.tag()).collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.actions.iter().filter(|a| a.action == action).count()
    }

    /// `abi.encode(bytes actions, bytes[] params)`
    pub fn encode(&self) -> Vec<u8> {
        let params = self
            .actions
            .iter()
            .map(|a| Token::Bytes(a.params.clone()))
            .collect();
        ethabi::encode(&[Token::Bytes(self.tags()), Token::Array(params)])
    }

    /// Inverse of [`ActionPayload::encode`]
    pub fn decode(data: &[u8]) -> Result<Self, DecodingError> {
        let tokens = ethabi::decode(
            &[
                ParamType::Bytes,
                ParamType::Array(Box::new(ParamType::Bytes)),
            ],
            data,
        )?;
        let mut tokens = tokens.into_iter();
        let tags = tokens
            .next()
            .and_then(Token::into_bytes)
            .ok_or_else(|| DecodingError::MissingField("actions".to_string()))?;
        let params = tokens
            .next()
            .and_then(Token::into_array)
            .ok_or_else(|| DecodingError::MissingField("params".to_string()))?;

        if tags.len() != params.len() {
            return Err(DecodingError::UnexpectedShape {
                expected: tags.len(),
                got: params.len(),
            });
        }

        let mut payload = ActionPayload::new();
        for (tag, param) in tags.into_iter().zip(params) {
            let action = Action::from_tag(tag).ok_or(DecodingError::UnknownActionTag(tag))?;
            let bytes = param
                .into_bytes()
                .ok_or_else(|| DecodingError::MissingField("params[]".to_string()))?;
            payload.push(action, bytes);
        }
        Ok(payload)
    }
}

/// MINT_POSITION parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintParams {
    pub key: PoolKey,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
    pub amount0_max: u128,
    pub amount1_max: u128,
    pub owner: Address,
    pub hook_data: Vec<u8>,
}

/// One position to close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePosition {
    pub token_id: U256,
    pub liquidity: U256,
    pub amount0_min: u128,
    pub amount1_min: u128,
    pub currency0: Address,
    pub currency1: Address,
    /// Also burn the NFT after removing liquidity
    pub burn: bool,
}

/// `((PoolKey, int24, int24), uint256, uint128, uint128, address, bytes)`
pub fn encode_mint(params: &MintParams) -> Vec<u8> {
    let position_config = Token::Tuple(vec![
        params.key.to_token(),
        Token::Int(signed_word(params.tick_lower as i64)),
        Token::Int(signed_word(params.tick_upper as i64)),
    ]);
    ethabi::encode(&[
        position_config,
        Token::Uint(params.liquidity),
        Token::Uint(U256::from(params.amount0_max)),
        Token::Uint(U256::from(params.amount1_max)),
        Token::Address(params.owner),
        Token::Bytes(params.hook_data.clone()),
    ])
}

/// `(uint256 tokenId, uint256 liquidity, uint128 amount0Min, uint128 amount1Min, bytes hookData)`
pub fn encode_decrease(
    token_id: U256,
    liquidity: U256,
    amount0_min: u128,
    amount1_min: u128,
    hook_data: &[u8],
) -> Vec<u8> {
    ethabi::encode(&[
        Token::Uint(token_id),
        Token::Uint(liquidity),
        Token::Uint(U256::from(amount0_min)),
        Token::Uint(U256::from(amount1_min)),
        Token::Bytes(hook_data.to_vec()),
    ])
}

/// `(uint256 tokenId, uint128 amount0Min, uint128 amount1Min, bytes hookData)`
pub fn encode_burn(token_id: U256, amount0_min: u128, amount1_min: u128, hook_data: &[u8]) -> Vec<u8> {
    ethabi::encode(&[
        Token::Uint(token_id),
        Token::Uint(U256::from(amount0_min)),
        Token::Uint(U256::from(amount1_min)),
        Token::Bytes(hook_data.to_vec()),
    ])
}

pub fn encode_settle_pair(currency0: Address, currency1: Address) -> Vec<u8> {
    ethabi::encode(&[Token::Address(currency0), Token::Address(currency1)])
}

pub fn encode_take_pair(currency0: Address, currency1: Address, recipient: Address) -> Vec<u8> {
    ethabi::encode(&[
        Token::Address(currency0),
        Token::Address(currency1),
        Token::Address(recipient),
    ])
}

/// Decode SETTLE_PAIR / TAKE_PAIR parameters back into addresses
pub fn decode_pair_params(params: &[u8], with_recipient: bool) -> Result<Vec<Address>, DecodingError> {
    let kinds = if with_recipient {
        vec![ParamType::Address; 3]
    } else {
        vec![ParamType::Address; 2]
    };
    ethabi::decode(&kinds, params)?
        .into_iter()
        .map(|t| {
            t.into_address()
                .ok_or_else(|| DecodingError::MissingField("currency".to_string()))
        })
        .collect()
}

/// N MINT_POSITION actions followed by exactly one SETTLE_PAIR
pub fn batch_mint(mints: &[MintParams]) -> Result<ActionPayload, ActionError> {
    let first = mints.first().ok_or(ActionError::EmptyBatch("mint"))?;
    let (currency0, currency1) = (first.key.currency0, first.key.currency1);

    let mut payload = ActionPayload::new();
    for mint in mints {
        if mint.key.currency0 != currency0 || mint.key.currency1 != currency1 {
            return Err(ActionError::MixedPairs(mint.key.currency0, mint.key.currency1));
        }
        if mint.tick_lower >= mint.tick_upper {
            return Err(ActionError::UnorderedTicks(mint.tick_lower, mint.tick_upper));
        }
        payload.push(Action::MintPosition, encode_mint(mint));
    }
    payload.push(Action::SettlePair, encode_settle_pair(currency0, currency1));
    Ok(payload)
}

/// M DECREASE_LIQUIDITY (each optionally followed by BURN_POSITION) and then
/// one TAKE_PAIR per distinct currency pair, in first-seen order
pub fn batch_close(closes: &[ClosePosition], recipient: Address) -> Result<ActionPayload, ActionError> {
    if closes.is_empty() {
        return Err(ActionError::EmptyBatch("close"));
    }

    let mut payload = ActionPayload::new();
    let mut pairs: Vec<(Address, Address)> = Vec::new();

    for close in closes {
        payload.push(
            Action::DecreaseLiquidity,
            encode_decrease(
                close.token_id,
                close.liquidity,
                close.amount0_min,
                close.amount1_min,
                &[],
            ),
        );
        if close.burn {
            payload.push(
                Action::BurnPosition,
                encode_burn(close.token_id, close.amount0_min, close.amount1_min, &[]),
            );
        }

        let pair = sort_currencies(close.currency0, close.currency1);
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }

    for (currency0, currency1) in pairs {
        payload.push(Action::TakePair, encode_take_pair(currency0, currency1, recipient));
    }
    Ok(payload)
}
