//! Ladder error taxonomy
//!
//! Expected failures are [`LadderError`] values carried inside outcomes;
//! `anyhow` is reserved for faults at the process boundary.

use dex::DecodingError;
use ethers::types::{Address, H256, U256};
use ladder_amm::{FeeError, PoolId, PoolKeyError, TickError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport and signing faults below the ladder logic
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("required call {label} (slot {slot}) failed")]
    CallFailed { slot: usize, label: String },
}

impl ChainError {
    pub fn rpc(e: impl std::fmt::Display) -> Self {
        ChainError::Rpc(e.to_string())
    }

    /// Providers report oversized log queries with free-form messages
    pub fn is_range_limit(&self) -> bool {
        match self {
            ChainError::Rpc(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("limit exceeded")
                    || lower.contains("block range")
                    || lower.contains("more than")
                    || lower.contains("too many")
            }
            _ => false,
        }
    }
}

/// Serializable tag of a [`LadderError`] for outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    IdentityMismatch,
    InsufficientBalance,
    Approval,
    SimulationFailure,
    Submission,
    Timeout,
    OnChainRevert,
    DecodeAmbiguity,
    Chain,
}

#[derive(Debug, Clone, Error)]
pub enum LadderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pool id {expected} does not match computed {computed}: {detail}")]
    IdentityMismatch {
        expected: PoolId,
        computed: PoolId,
        detail: String,
    },

    #[error("insufficient balance of {token:?}: have {have}, need {need}")]
    InsufficientBalance { token: Address, have: U256, need: U256 },

    #[error("approval error: {0}")]
    Approval(String),

    #[error("simulation failed: {0}")]
    SimulationFailure(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("no receipt for {tx_hash:?} after {waited_secs}s; the transaction may still land")]
    Timeout { tx_hash: H256, waited_secs: u64 },

    #[error("transaction {tx_hash:?} reverted on chain")]
    OnChainRevert { tx_hash: H256, gas_used: Option<U256> },

    #[error("ambiguous decode: {0}")]
    DecodeAmbiguity(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl LadderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LadderError::Configuration(_) => ErrorKind::Configuration,
            LadderError::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            LadderError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LadderError::Approval(_) => ErrorKind::Approval,
            LadderError::SimulationFailure(_) => ErrorKind::SimulationFailure,
            LadderError::Submission(_) => ErrorKind::Submission,
            LadderError::Timeout { .. } => ErrorKind::Timeout,
            LadderError::OnChainRevert { .. } => ErrorKind::OnChainRevert,
            LadderError::DecodeAmbiguity(_) => ErrorKind::DecodeAmbiguity,
            LadderError::Chain(_) => ErrorKind::Chain,
        }
    }

    /// Timeouts and transport faults may succeed on a later attempt.
    /// Simulation failures never are retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LadderError::Timeout { .. } | LadderError::Chain(ChainError::Rpc(_)))
    }

    /// Transaction hash the failure refers to, if one was broadcast
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            LadderError::Timeout { tx_hash, .. } | LadderError::OnChainRevert { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    pub fn gas_used(&self) -> Option<U256> {
        match self {
            LadderError::OnChainRevert { gas_used, .. } => *gas_used,
            _ => None,
        }
    }
}

impl From<DecodingError> for LadderError {
    fn from(e: DecodingError) -> Self {
        match e {
            DecodingError::Ambiguous(reason) => LadderError::DecodeAmbiguity(reason),
            other => LadderError::Chain(ChainError::Decode(other.to_string())),
        }
    }
}

impl From<PoolKeyError> for LadderError {
    fn from(e: PoolKeyError) -> Self {
        LadderError::Configuration(e.to_string())
    }
}

impl From<FeeError> for LadderError {
    fn from(e: FeeError) -> Self {
        LadderError::Configuration(e.to_string())
    }
}

impl From<TickError> for LadderError {
    fn from(e: TickError) -> Self {
        LadderError::Configuration(e.to_string())
    }
}
