//! Multicall3 `aggregate3` encoding

use super::{encode_call, function, param, DecodingError};
use ethabi::{Function, ParamType, StateMutability, Token};
use ethereum_types::Address;
use once_cell::sync::Lazy;

fn call3_type() -> ParamType {
    ParamType::Tuple(vec![ParamType::Address, ParamType::Bool, ParamType::Bytes])
}

fn result_type() -> ParamType {
    ParamType::Tuple(vec![ParamType::Bool, ParamType::Bytes])
}

/// `aggregate3((address target, bool allowFailure, bytes callData)[]) returns ((bool success, bytes returnData)[])`
pub static AGGREGATE3: Lazy<Function> = Lazy::new(|| {
    function(
        "aggregate3",
        vec![param("calls", ParamType::Array(Box::new(call3_type())))],
        vec![param("returnData", ParamType::Array(Box::new(result_type())))],
        StateMutability::Payable,
    )
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call3 {
    pub target: Address,
    pub allow_failure: bool,
    pub call_data: Vec<u8>,
}

impl Call3 {
    pub fn new(target: Address, call_data: Vec<u8>) -> Self {
        Self {
            target,
            allow_failure: true,
            call_data,
        }
    }

    pub fn strict(mut self) -> Self {
        self.allow_failure = false;
        self
    }

    fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.target),
            Token::Bool(self.allow_failure),
            Token::Bytes(self.call_data.clone()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Vec<u8>,
}

pub fn encode_aggregate3(calls: &[Call3]) -> Vec<u8> {
    let array = Token::Array(calls.iter().map(Call3::to_token).collect());
    encode_call(&AGGREGATE3, &[array])
}

pub fn decode_aggregate3(data: &[u8]) -> Result<Vec<CallResult>, DecodingError> {
    let tokens = AGGREGATE3.decode_output(data)?;
    let results = tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| DecodingError::MissingField("returnData".to_string()))?;

    results
        .into_iter()
        .map(|entry| {
            let mut fields = entry
                .into_tuple()
                .ok_or_else(|| DecodingError::MissingField("result".to_string()))?
                .into_iter();
            let success = fields
                .next()
                .and_then(Token::into_bool)
                .ok_or_else(|| DecodingError::MissingField("success".to_string()))?;
            let return_data = fields
                .next()
                .and_then(Token::into_bytes)
                .ok_or_else(|| DecodingError::MissingField("returnData".to_string()))?;
            Ok(CallResult { success, return_data })
        })
        .collect()
}

/// Encode a result list the way Multicall3 returns it. Used by test doubles.
pub fn encode_aggregate3_result(results: &[CallResult]) -> Vec<u8> {
    ethabi::encode(&[Token::Array(
        results
            .iter()
            .map(|r| Token::Tuple(vec![Token::Bool(r.success), Token::Bytes(r.return_data.clone())]))
            .collect(),
    )])
}

/// Decode the call list out of aggregate3 calldata. Used by test doubles.
pub fn decode_aggregate3_input(data: &[u8]) -> Result<Vec<Call3>, DecodingError> {
    if data.len() < 4 {
        return Err(DecodingError::MissingField("selector".to_string()));
    }
    let tokens = AGGREGATE3.decode_input(&data[4..])?;
    let calls = tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| DecodingError::MissingField("calls".to_string()))?;
    calls
        .into_iter()
        .map(|entry| {
            let fields = entry
                .into_tuple()
                .ok_or_else(|| DecodingError::MissingField("call".to_string()))?;
            match fields.as_slice() {
                [Token::Address(target), Token::Bool(allow_failure), Token::Bytes(call_data)] => Ok(Call3 {
                    target: *target,
                    allow_failure: *allow_failure,
                    call_data: call_data.clone(),
                }),
                other => Err(DecodingError::UnexpectedShape {
                    expected: 3,
                    got: other.len(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector() {
        assert_eq!(hex::encode(AGGREGATE3.short_signature()), "82ad56cb");
    }

    #[test]
    fn test_input_and_result_codec() {
        let calls = vec![
            Call3::new(Address::from_low_u64_be(1), vec![0xaa, 0xbb]),
            Call3::new(Address::from_low_u64_be(2), vec![]).strict(),
        ];
        let encoded = encode_aggregate3(&calls);
        assert_eq!(&encoded[..4], &AGGREGATE3.short_signature());
        assert_eq!(decode_aggregate3_input(&encoded).unwrap(), calls);

        let results = vec![
            CallResult { success: true, return_data: vec![1; 32] },
            CallResult { success: false, return_data: vec![] },
        ];
        assert_eq!(decode_aggregate3(&encode_aggregate3_result(&results)).unwrap(), results);
    }
}
