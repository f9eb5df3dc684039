//! Shared DEX functionality library
//!
//! Wire-level encoding for singleton pool-manager protocols, shared by the
//! ladder strategy and its tooling.
//!
//! # Architecture
//!
//! ```text
//! services/adapters/dex_utils/
//! ├── abi/
//! │   ├── actions.rs           # Tagged action batches for modifyLiquidities
//! │   ├── position_info.rs     # PositionInfo layout disambiguation
//! │   ├── position_manager.rs  # Position manager calls and reads
//! │   ├── pool_manager.rs      # getSlot0 / getLiquidity
//! │   ├── erc20.rs             # ERC20 and Permit2 approvals
//! │   ├── multicall.rs         # Multicall3 aggregate3
//! │   └── events.rs            # Transfer decoding, decoding errors
//! └── event_signatures.rs      # Precomputed event topics
//! ```
//!
//! # Design Principles
//! - Single canonical source for protocol ABIs
//! - Both contract families behind one pool key type
//! - Decoding reports its confidence instead of guessing silently

pub mod abi;
pub mod event_signatures;

// Re-export commonly used types
pub use abi::{
    actions::{batch_close, batch_mint},
    decode_position_info, minted_token_ids, Action, ActionError, ActionPayload, ApprovalRecord,
    Call3, CallResult, ClosePosition, DecodeConfidence, DecodedPositionInfo, DecodedTicks,
    DecodingError, KeyLayout, MintParams, PoolRef, RawPositionInfo, Slot0, TransferLog,
};

pub use event_signatures::{to_hex_string, ERC721_TRANSFER};
