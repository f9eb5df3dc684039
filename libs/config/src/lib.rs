//! Deployments, token metadata and runtime settings for the ladder service
//!
//! Contract addresses are looked up per `(chain_id, ProtocolFamily)`; anything
//! a deployment leaves unset (a missing state view, a fork) is filled from the
//! `[network]` overrides by
//! [`LadderServiceConfig::resolve_addresses`].
//!
//! ```rust
//! use ladder_config::{deployment, ProtocolFamily};
//!
//! let bsc = deployment(56, ProtocolFamily::Uniswap).unwrap();
//! assert!(bsc.state_view.is_some());
//! ```

pub mod protocol;
pub mod service;
pub mod service_config;
pub mod tokens;

pub use protocol::*;
pub use service_config::{
    ApprovalSettings, ExecutionSettings, IndexerSettings, LadderDefaults, LadderServiceConfig,
    LoggingSettings, NetworkSettings, ResolvedAddresses,
};
