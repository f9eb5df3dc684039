//! Testing utilities for the ladder components
//!
//! [`MockChain`] answers `eth_call` from canned responses keyed by
//! (target, selector) or by exact calldata, dispatches Multicall3
//! `aggregate3` to those same responses, and mines every broadcast
//! transaction immediately unless told otherwise. Approvals sent through a
//! linked [`MockSigner`] update the allowances later reads return.

use crate::chain::{ChainClient, TransactionSigner};
use crate::errors::ChainError;
use async_trait::async_trait;
use dex::abi::erc20::{ALLOWANCE, APPROVE, PERMIT2_APPROVE};
use dex::abi::multicall::{decode_aggregate3_input, encode_aggregate3_result, AGGREGATE3};
use dex::CallResult;
use ethers::abi::Token;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Filter, Log, TransactionReceipt, ValueOrArray, H160, H256, U256, U64,
};
use ethers::utils::keccak256;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Multicall address used by the mock unless overridden
pub const MOCK_MULTICALL: Address = H160([0xca; 20]);

#[derive(Debug, Clone)]
enum Response {
    Data(Vec<u8>),
    Revert,
}

type SignedLog = Arc<Mutex<Vec<(Bytes, TypedTransaction)>>>;

struct MockState {
    chain_id: u64,
    by_selector: HashMap<(Address, [u8; 4]), Response>,
    by_calldata: HashMap<(Address, Vec<u8>), Response>,
    multicall_enabled: bool,
    pending_nonce: u64,
    gas_estimate: Result<U256, String>,
    gas_price: U256,
    sent: Vec<Bytes>,
    calls: Vec<(Address, Vec<u8>)>,
    receipt_success: bool,
    receipt_gas_used: U256,
    receipt_logs: Vec<Log>,
    never_mine: bool,
    apply_approvals: bool,
    block_number: u64,
    logs: Vec<Log>,
    max_log_range: Option<u64>,
    signed: SignedLog,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            chain_id: 56,
            by_selector: HashMap::new(),
            by_calldata: HashMap::new(),
            multicall_enabled: true,
            pending_nonce: 0,
            gas_estimate: Ok(U256::from(200_000u64)),
            gas_price: U256::from(1_000_000_000u64),
            sent: Vec::new(),
            calls: Vec::new(),
            receipt_success: true,
            receipt_gas_used: U256::from(150_000u64),
            receipt_logs: Vec::new(),
            never_mine: false,
            apply_approvals: true,
            block_number: 1_000_000,
            logs: Vec::new(),
            max_log_range: None,
            signed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockState {
    fn lookup(&self, target: Address, data: &[u8]) -> Response {
        if let Some(response) = self.by_calldata.get(&(target, data.to_vec())) {
            return response.clone();
        }
        if data.len() >= 4 {
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&data[..4]);
            if let Some(response) = self.by_selector.get(&(target, selector)) {
                return response.clone();
            }
        }
        Response::Revert
    }

    fn apply_effects(&mut self, tx: &TypedTransaction) {
        let (Some(to), Some(data), Some(from)) = (tx.to_addr().copied(), tx.data().cloned(), tx.from().copied()) else {
            return;
        };
        if data.len() < 4 {
            return;
        }
        let selector = &data[..4];

        if selector == APPROVE.short_signature() {
            if let Ok(args) = APPROVE.decode_input(&data[4..]) {
                if let Some(amount) = args.get(1).cloned().and_then(Token::into_uint) {
                    self.by_selector
                        .insert((to, ALLOWANCE.short_signature()), Response::Data(ethers::abi::encode(&[Token::Uint(amount)])));
                }
            }
        } else if selector == PERMIT2_APPROVE.short_signature() {
            if let Ok(args) = PERMIT2_APPROVE.decode_input(&data[4..]) {
                let mut args = args.into_iter();
                let token = args.next().and_then(Token::into_address);
                let spender = args.next().and_then(Token::into_address);
                let amount = args.next().and_then(Token::into_uint);
                let expiration = args.next().and_then(Token::into_uint);
                if let (Some(token), Some(spender), Some(amount), Some(expiration)) = (token, spender, amount, expiration) {
                    let key = dex::abi::erc20::encode_permit2_allowance(from, token, spender);
                    let record = ethers::abi::encode(&[Token::Uint(amount), Token::Uint(expiration), Token::Uint(U256::zero())]);
                    self.by_calldata.insert((to, key), Response::Data(record));
                }
            }
        }
    }
}

/// In-memory [`ChainClient`]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn multicall_address(&self) -> Address {
        MOCK_MULTICALL
    }

    /// Signer whose transactions this chain can inspect when they are broadcast
    pub fn signer(&self, address: Address) -> MockSigner {
        MockSigner {
            address,
            fail: Mutex::new(false),
            signed: self.state.lock().signed.clone(),
        }
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
    }

    /// Answer every call to `target` with this selector
    pub fn set_response(&self, target: Address, selector: [u8; 4], data: Vec<u8>) {
        self.state
            .lock()
            .by_selector
            .insert((target, selector), Response::Data(data));
    }

    pub fn set_uint(&self, target: Address, selector: [u8; 4], value: U256) {
        self.set_response(target, selector, ethers::abi::encode(&[Token::Uint(value)]));
    }

    /// Answer only this exact calldata; takes precedence over selector responses
    pub fn set_call_response(&self, target: Address, call_data: Vec<u8>, data: Vec<u8>) {
        self.state
            .lock()
            .by_calldata
            .insert((target, call_data), Response::Data(data));
    }

    pub fn set_revert(&self, target: Address, selector: [u8; 4]) {
        self.state.lock().by_selector.insert((target, selector), Response::Revert);
    }

    /// Make `aggregate3` itself fail so callers fall back to single calls
    pub fn disable_multicall(&self) {
        self.state.lock().multicall_enabled = false;
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state.lock().pending_nonce = nonce;
    }

    pub fn set_gas_estimate(&self, estimate: Result<U256, String>) {
        self.state.lock().gas_estimate = estimate;
    }

    pub fn set_gas_price(&self, price: U256) {
        self.state.lock().gas_price = price;
    }

    pub fn set_receipt_status(&self, success: bool) {
        self.state.lock().receipt_success = success;
    }

    pub fn set_receipt_logs(&self, logs: Vec<Log>) {
        self.state.lock().receipt_logs = logs;
    }

    pub fn set_never_mine(&self, never: bool) {
        self.state.lock().never_mine = never;
    }

    /// Stop broadcast approvals from changing later allowance reads
    pub fn freeze_approvals(&self) {
        self.state.lock().apply_approvals = false;
    }

    pub fn set_block_number(&self, block: u64) {
        self.state.lock().block_number = block;
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    /// Reject log queries spanning more than `blocks`
    pub fn set_max_log_range(&self, blocks: u64) {
        self.state.lock().max_log_range = Some(blocks);
    }

    /// Top-level `eth_call`s made so far (an aggregate counts once)
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Transactions broadcast through a linked signer, in order
    pub fn sent_transactions(&self) -> Vec<TypedTransaction> {
        let state = self.state.lock();
        let signed = state.signed.lock();
        state
            .sent
            .iter()
            .filter_map(|raw| signed.iter().find(|(r, _)| r == raw).map(|(_, tx)| tx.clone()))
            .collect()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().chain_id)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock();
        state.calls.push((to, data.to_vec()));

        if to == MOCK_MULTICALL && data.len() >= 4 && data[..4] == AGGREGATE3.short_signature() {
            if !state.multicall_enabled {
                return Err(ChainError::Rpc("execution reverted: multicall unavailable".into()));
            }
            let inner = decode_aggregate3_input(&data).map_err(|e| ChainError::Decode(e.to_string()))?;
            let results: Vec<CallResult> = inner
                .iter()
                .map(|call| match state.lookup(call.target, &call.call_data) {
                    Response::Data(return_data) => CallResult {
                        success: true,
                        return_data,
                    },
                    Response::Revert => CallResult {
                        success: false,
                        return_data: Vec::new(),
                    },
                })
                .collect();
            return Ok(Bytes::from(encode_aggregate3_result(&results)));
        }

        match state.lookup(to, &data) {
            Response::Data(bytes) => Ok(Bytes::from(bytes)),
            Response::Revert => Err(ChainError::Rpc("execution reverted".into())),
        }
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _data: Bytes, _value: U256) -> Result<U256, ChainError> {
        self.state.lock().gas_estimate.clone().map_err(ChainError::Rpc)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.state.lock().gas_price)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.state.lock().pending_nonce)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError> {
        let mut state = self.state.lock();
        let tx = state
            .signed
            .lock()
            .iter()
            .rev()
            .find(|(r, _)| *r == raw)
            .map(|(_, tx)| tx.clone());
        if let Some(tx) = tx {
            if state.apply_approvals && state.receipt_success && !state.never_mine {
                state.apply_effects(&tx);
            }
        }
        state.sent.push(raw.clone());
        state.pending_nonce += 1;
        Ok(H256::from(keccak256(&raw)))
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ChainError> {
        let state = self.state.lock();
        if state.never_mine {
            return Ok(None);
        }
        let known = state.sent.iter().any(|raw| H256::from(keccak256(raw)) == tx_hash);
        if !known {
            return Ok(None);
        }
        Ok(Some(TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(state.block_number)),
            gas_used: Some(state.receipt_gas_used),
            status: Some(U64::from(state.receipt_success as u64)),
            logs: state.receipt_logs.clone(),
            ..Default::default()
        }))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().block_number)
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        let state = self.state.lock();
        let from = filter.get_from_block().map(|b| b.as_u64()).unwrap_or_default();
        let to = filter
            .get_to_block()
            .map(|b| b.as_u64())
            .unwrap_or(state.block_number);

        if let Some(max) = state.max_log_range {
            if to.saturating_sub(from) + 1 > max {
                return Err(ChainError::Rpc(format!("eth_getLogs block range limit exceeded ({max})")));
            }
        }

        let recipient = match &filter.topics[2] {
            Some(ValueOrArray::Value(Some(topic))) => Some(*topic),
            _ => None,
        };
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|b| b.as_u64()).unwrap_or_default();
                block >= from && block <= to
            })
            .filter(|log| recipient.map_or(true, |r| log.topics.get(2) == Some(&r)))
            .cloned()
            .collect())
    }
}

/// [`TransactionSigner`] that records what it signs and returns unsigned RLP
pub struct MockSigner {
    address: Address,
    fail: Mutex<bool>,
    signed: SignedLog,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            fail: Mutex::new(false),
            signed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn signed(&self) -> Vec<TypedTransaction> {
        self.signed.lock().iter().map(|(_, tx)| tx.clone()).collect()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, ChainError> {
        if *self.fail.lock() {
            return Err(ChainError::Signing("mock signer refused".into()));
        }
        let raw = tx.rlp();
        self.signed.lock().push((raw.clone(), tx.clone()));
        Ok(raw)
    }
}

/// ERC721 Transfer log as emitted by a position manager
pub fn transfer_log(manager: Address, from: Address, to: Address, token_id: u64, block: u64) -> Log {
    Log {
        address: manager,
        topics: vec![
            dex::ERC721_TRANSFER,
            H256::from(from),
            H256::from(to),
            H256::from_low_u64_be(token_id),
        ],
        block_number: Some(U64::from(block)),
        ..Default::default()
    }
}
