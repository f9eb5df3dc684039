//! # Ladder Strategy - Liquidity Ladder Transaction Layer
//!
//! ## Purpose
//!
//! Builds and executes liquidity ladders (ordered sets of concentrated
//! liquidity positions across a price range) against singleton pool-manager
//! AMMs, and closes them again. Covers the on-chain side only: the position
//! schedule comes from an external distribution.
//!
//! ## Architecture Role
//!
//! ```text
//! LadderConfig ──→ [Orchestrator] ──→ PoolIdentity / Reconcile (ladder_amm)
//!                        │
//!        ┌───────────────┼────────────────────┐
//!        ↓               ↓                    ↓
//!  [BatchCallAggregator] [ApprovalStateMachine] [ActionCodec (dex)]
//!        ↓               ↓                    ↓
//!   ChainClient ←── [TransactionSubmitter] ←── [NonceSequencer]
//! ```
//!
//! ## Entry Points
//!
//! [`LadderOrchestrator`] exposes pool identity, preview, approval check and
//! grant, ladder creation, batch close and owned-position listing.

pub mod approvals;
pub mod chain;
pub mod config;
pub mod decimals;
pub mod distribution;
pub mod errors;
pub mod logging;
pub mod multicall;
pub mod nonce;
pub mod orchestrator;
pub mod pools;
pub mod positions;
pub mod submit;
pub mod testing;

pub use approvals::{ApprovalLeg, ApprovalReport, ApprovalState, ApprovalStateMachine};
pub use chain::{ChainClient, EthersChain, TransactionSigner, WalletSigner};
pub use config::{CloseFlags, CreateFlags, LadderConfig};
pub use decimals::DecimalsCache;
pub use distribution::{DistributionRequest, DistributionSource, FixedDistribution, PositionSpec, ScheduleFile};
pub use errors::{ChainError, ErrorKind, LadderError};
pub use multicall::{BatchCall, BatchCallAggregator};
pub use nonce::{NonceSequencer, NonceSnapshot};
pub use orchestrator::{
    compute_pool_identity, ApprovalOutcome, CloseOutcome, LadderOrchestrator, LadderOutcome, LadderPreview,
    PoolIdentity, PositionSummary,
};
pub use submit::{GasLimit, SubmittedTx, TransactionSubmitter, TxRequest};
