//! Position manager ABIs
//!
//! Writes go through `modifyLiquidities(bytes unlockData, uint256 deadline)`
//! carrying an [`ActionPayload`](super::ActionPayload). Reads cover the two
//! contract families: `getPoolAndPositionInfo` + `getPositionLiquidity` on
//! Uniswap, `positions` on PancakeSwap.
//!
//! `getPoolAndPositionInfo` is decoded by response shape rather than by a
//! fixed output ABI, since deployments disagree on whether `info` is a packed
//! word or a tuple.

use super::position_info::RawPositionInfo;
use super::{encode_call, function, param, pool_key_from_token, token_address, token_i32, token_u128, token_uint};
use super::{DecodingError, KeyLayout};
use ethabi::{Function, ParamType, StateMutability, Token};
use ethereum_types::{Address, U256};
use ladder_amm::PoolKey;
use once_cell::sync::Lazy;

pub static MODIFY_LIQUIDITIES: Lazy<Function> = Lazy::new(|| {
    function(
        "modifyLiquidities",
        vec![
            param("unlockData", ParamType::Bytes),
            param("deadline", ParamType::Uint(256)),
        ],
        vec![],
        StateMutability::Payable,
    )
});

fn initialize_pool_function(layout: KeyLayout) -> Function {
    function(
        "initializePool",
        vec![
            param("key", layout.param_type()),
            param("sqrtPriceX96", ParamType::Uint(160)),
        ],
        vec![param("tick", ParamType::Int(24))],
        StateMutability::Payable,
    )
}

pub static INITIALIZE_POOL: Lazy<Function> = Lazy::new(|| initialize_pool_function(KeyLayout::Standard));

pub static INITIALIZE_POOL_ALTERNATE: Lazy<Function> =
    Lazy::new(|| initialize_pool_function(KeyLayout::Alternate));

pub static GET_POOL_AND_POSITION_INFO: Lazy<Function> = Lazy::new(|| {
    function(
        "getPoolAndPositionInfo",
        vec![param("tokenId", ParamType::Uint(256))],
        vec![
            param("poolKey", KeyLayout::Standard.param_type()),
            param("info", ParamType::Uint(256)),
        ],
        StateMutability::View,
    )
});

pub static GET_POSITION_LIQUIDITY: Lazy<Function> = Lazy::new(|| {
    function(
        "getPositionLiquidity",
        vec![param("tokenId", ParamType::Uint(256))],
        vec![param("liquidity", ParamType::Uint(128))],
        StateMutability::View,
    )
});

/// PancakeSwap `positions(uint256)`; trailing fee-growth and subscriber fields are ignored
pub static POSITIONS: Lazy<Function> = Lazy::new(|| {
    function(
        "positions",
        vec![param("tokenId", ParamType::Uint(256))],
        vec![
            param("poolKey", KeyLayout::Alternate.param_type()),
            param("tickLower", ParamType::Int(24)),
            param("tickUpper", ParamType::Int(24)),
            param("liquidity", ParamType::Uint(128)),
        ],
        StateMutability::View,
    )
});

pub static OWNER_OF: Lazy<Function> = Lazy::new(|| {
    function(
        "ownerOf",
        vec![param("tokenId", ParamType::Uint(256))],
        vec![param("owner", ParamType::Address)],
        StateMutability::View,
    )
});

pub static TOKEN_OF_OWNER_BY_INDEX: Lazy<Function> = Lazy::new(|| {
    function(
        "tokenOfOwnerByIndex",
        vec![
            param("owner", ParamType::Address),
            param("index", ParamType::Uint(256)),
        ],
        vec![param("tokenId", ParamType::Uint(256))],
        StateMutability::View,
    )
});

/// `modifyLiquidities(payload, deadline)`
pub fn encode_modify_liquidities(unlock_data: Vec<u8>, deadline: u64) -> Vec<u8> {
    encode_call(
        &MODIFY_LIQUIDITIES,
        &[Token::Bytes(unlock_data), Token::Uint(U256::from(deadline))],
    )
}

/// Split `modifyLiquidities` calldata back into (payload, deadline)
pub fn decode_modify_liquidities(data: &[u8]) -> Result<(Vec<u8>, U256), DecodingError> {
    if data.len() < 4 || data[..4] != MODIFY_LIQUIDITIES.short_signature() {
        return Err(DecodingError::MissingField("modifyLiquidities selector".to_string()));
    }
    let tokens = MODIFY_LIQUIDITIES.decode_input(&data[4..])?;
    let mut tokens = tokens.into_iter();
    let payload = tokens
        .next()
        .and_then(Token::into_bytes)
        .ok_or_else(|| DecodingError::MissingField("unlockData".to_string()))?;
    let deadline = tokens
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| DecodingError::MissingField("deadline".to_string()))?;
    Ok((payload, deadline))
}

/// `initializePool(key, sqrtPriceX96)` with the key tuple of the pool's family
pub fn encode_initialize_pool(key: &PoolKey, sqrt_price_x96: U256) -> Vec<u8> {
    let function = match KeyLayout::of(&key.variant) {
        KeyLayout::Standard => &*INITIALIZE_POOL,
        KeyLayout::Alternate => &*INITIALIZE_POOL_ALTERNATE,
    };
    encode_call(function, &[key.to_token(), Token::Uint(sqrt_price_x96)])
}

fn encode_token_id(function: &Function, token_id: U256) -> Vec<u8> {
    encode_call(function, &[Token::Uint(token_id)])
}

pub fn encode_get_pool_and_position_info(token_id: U256) -> Vec<u8> {
    encode_token_id(&GET_POOL_AND_POSITION_INFO, token_id)
}

pub fn encode_get_position_liquidity(token_id: U256) -> Vec<u8> {
    encode_token_id(&GET_POSITION_LIQUIDITY, token_id)
}

pub fn encode_positions(token_id: U256) -> Vec<u8> {
    encode_token_id(&POSITIONS, token_id)
}

pub fn encode_owner_of(token_id: U256) -> Vec<u8> {
    encode_token_id(&OWNER_OF, token_id)
}

pub fn encode_token_of_owner_by_index(owner: Address, index: u64) -> Vec<u8> {
    encode_call(
        &TOKEN_OF_OWNER_BY_INDEX,
        &[Token::Address(owner), Token::Uint(U256::from(index))],
    )
}

/// Decode `getPoolAndPositionInfo` output: the inline key tuple, then one
/// packed word or a 2-3 word tuple
pub fn decode_pool_and_position_info(
    data: &[u8],
    layout: KeyLayout,
) -> Result<(PoolKey, RawPositionInfo), DecodingError> {
    if data.len() % 32 != 0 {
        return Err(DecodingError::AbiParsingError(format!(
            "response length {} is not word aligned",
            data.len()
        )));
    }
    let words = data.len() / 32;
    let key_words = layout.words();
    if words <= key_words {
        return Err(DecodingError::UnexpectedShape {
            expected: key_words + 1,
            got: words,
        });
    }

    let key_token = ethabi::decode(&[layout.param_type()], &data[..key_words * 32])?
        .into_iter()
        .next()
        .ok_or_else(|| DecodingError::MissingField("poolKey".to_string()))?;
    let key = pool_key_from_token(&key_token, layout)?;

    let info_words: Vec<U256> = data[key_words * 32..]
        .chunks(32)
        .map(U256::from_big_endian)
        .collect();
    let info = RawPositionInfo::from_words(&info_words)?;
    Ok((key, info))
}

pub fn decode_position_liquidity(data: &[u8]) -> Result<u128, DecodingError> {
    let tokens = GET_POSITION_LIQUIDITY.decode_output(data)?;
    tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("liquidity".to_string()))
        .and_then(|t| token_u128(t, "liquidity"))
}

/// PancakeSwap position: (key, tickLower, tickUpper, liquidity)
pub fn decode_positions(data: &[u8]) -> Result<(PoolKey, i32, i32, u128), DecodingError> {
    let tokens = POSITIONS.decode_output(data)?;
    if tokens.len() < 4 {
        return Err(DecodingError::UnexpectedShape {
            expected: 4,
            got: tokens.len(),
        });
    }
    Ok((
        pool_key_from_token(&tokens[0], KeyLayout::Alternate)?,
        token_i32(&tokens[1], "tickLower")?,
        token_i32(&tokens[2], "tickUpper")?,
        token_u128(&tokens[3], "liquidity")?,
    ))
}

pub fn decode_owner_of(data: &[u8]) -> Result<Address, DecodingError> {
    let tokens = OWNER_OF.decode_output(data)?;
    tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("owner".to_string()))
        .and_then(|t| token_address(t, "owner"))
}

pub fn decode_token_id(data: &[u8]) -> Result<U256, DecodingError> {
    let tokens = TOKEN_OF_OWNER_BY_INDEX.decode_output(data)?;
    tokens
        .first()
        .ok_or_else(|| DecodingError::MissingField("tokenId".to_string()))
        .and_then(|t| token_uint(t, "tokenId"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::position_info::{decode_position_info, pack_standard, DecodeConfidence, InfoField};
    use ladder_amm::pool_key::signed_word;
    use ladder_amm::PoolVariant;

    fn key() -> PoolKey {
        PoolKey::new(
            Address::from_low_u64_be(0x10),
            Address::from_low_u64_be(0x20),
            500,
            10,
            Address::zero(),
            PoolVariant::Standard,
        )
        .unwrap()
    }

    #[test]
    fn test_selectors() {
        assert_eq!(hex::encode(MODIFY_LIQUIDITIES.short_signature()), "dd46508f");
        assert_eq!(hex::encode(OWNER_OF.short_signature()), "6352211e");
        assert_eq!(hex::encode(POSITIONS.short_signature()), "99fbab88");
    }

    #[test]
    fn test_modify_liquidities_round_trip() {
        let data = encode_modify_liquidities(vec![1, 2, 3], 1_700_003_600);
        let (payload, deadline) = decode_modify_liquidities(&data).unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
        assert_eq!(deadline, U256::from(1_700_003_600u64));
    }

    #[test]
    fn test_packed_info_response() {
        let key = key();
        let packed = pack_standard(&key.id(), -100, 200, 0);
        let mut data = ethabi::encode(&key.abi_fields());
        data.extend(ethabi::encode(&[Token::Uint(packed)]));

        let (decoded_key, info) = decode_pool_and_position_info(&data, KeyLayout::Standard).unwrap();
        assert_eq!(decoded_key, key);
        assert_eq!(info, RawPositionInfo::Packed(packed));
        let ticks = decode_position_info(&info, key.tick_spacing).unwrap();
        assert_eq!((ticks.tick_lower, ticks.tick_upper), (-100, 200));
        assert_eq!(ticks.confidence, DecodeConfidence::Strong);
    }

    #[test]
    fn test_tuple_info_response() {
        let key = key();
        let mut data = ethabi::encode(&key.abi_fields());
        data.extend(ethabi::encode(&[
            Token::Int(signed_word(-50)),
            Token::Int(signed_word(50)),
        ]));
        let (_, info) = decode_pool_and_position_info(&data, KeyLayout::Standard).unwrap();
        assert_eq!(info, RawPositionInfo::Tuple(vec![InfoField::Int(-50), InfoField::Int(50)]));
    }

    #[test]
    fn test_short_response_rejected() {
        let data = ethabi::encode(&key().abi_fields());
        assert!(matches!(
            decode_pool_and_position_info(&data, KeyLayout::Standard),
            Err(DecodingError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_pancake_positions_decode() {
        let key = PoolKey::new(
            Address::from_low_u64_be(0x10),
            Address::from_low_u64_be(0x20),
            2500,
            50,
            Address::zero(),
            PoolVariant::Alternate {
                pool_manager: Address::from_low_u64_be(0x77),
            },
        )
        .unwrap();
        let data = ethabi::encode(&[
            key.to_token(),
            Token::Int(signed_word(-500)),
            Token::Int(signed_word(500)),
            Token::Uint(U256::from(42u64)),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Address(Address::zero()),
        ]);
        let (decoded, lower, upper, liquidity) = decode_positions(&data).unwrap();
        assert_eq!(decoded, key);
        assert_eq!((lower, upper, liquidity), (-500, 500, 42));
    }

    #[test]
    fn test_initialize_pool_uses_family_layout() {
        let standard = encode_initialize_pool(&key(), U256::one() << 96);
        assert_eq!(standard.len(), 4 + 6 * 32);
        let alternate_key = PoolKey {
            variant: PoolVariant::Alternate {
                pool_manager: Address::from_low_u64_be(0x77),
            },
            ..key()
        };
        let alternate = encode_initialize_pool(&alternate_key, U256::one() << 96);
        assert_eq!(alternate.len(), 4 + 7 * 32);
        assert_ne!(standard[..4], alternate[..4]);
    }
}
