//! Protocol deployments
//!
//! Contract addresses for the supported singleton pool-manager deployments,
//! the Permit2 allowance registries and the Multicall3 aggregator. Addresses
//! are kept as checksummed strings and parsed by the consumer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Multicall3 is deployed at the same address on every supported chain
pub const MULTICALL3: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Zero address, used for "no hooks"
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Supported chain ids
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const BSC: u64 = 56;
    pub const BASE: u64 = 8453;
}

/// Which protocol family a pool belongs to. Determines the pool-key layout,
/// the Permit2 deployment and where pool state is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    #[default]
    Uniswap,
    #[serde(alias = "pancake")]
    PancakeSwap,
}

impl ProtocolFamily {
    /// Permit2 registry used by this family's position manager
    pub fn permit2(self) -> &'static str {
        match self {
            ProtocolFamily::Uniswap => "0x000000000022D473030F116dDEE9F6B43aC78BA3",
            ProtocolFamily::PancakeSwap => "0x31c2F6fcFf4F8759b3Bd5Bf0e1084A055615c768",
        }
    }

    /// Whether pool ids use the alternate (manager-inclusive) key layout
    pub fn uses_alternate_pool_key(self) -> bool {
        matches!(self, ProtocolFamily::PancakeSwap)
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::Uniswap => write!(f, "uniswap"),
            ProtocolFamily::PancakeSwap => write!(f, "pancakeswap"),
        }
    }
}

impl FromStr for ProtocolFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniswap" | "uni" => Ok(ProtocolFamily::Uniswap),
            "pancakeswap" | "pancake" | "pcs" => Ok(ProtocolFamily::PancakeSwap),
            other => Err(format!("unknown protocol family '{other}'")),
        }
    }
}

/// Contract addresses for one (chain, protocol) deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub chain_id: u64,
    pub protocol: ProtocolFamily,
    pub pool_manager: &'static str,
    pub position_manager: &'static str,
    /// Read-only lens over pool state. Absent where the manager is read directly.
    pub state_view: Option<&'static str>,
    pub vault: Option<&'static str>,
}

impl Deployment {
    pub fn permit2(&self) -> &'static str {
        self.protocol.permit2()
    }
}

const DEPLOYMENTS: &[Deployment] = &[
    Deployment {
        chain_id: chains::BSC,
        protocol: ProtocolFamily::Uniswap,
        pool_manager: "0x28e2ea090877bf75740558f6bfb36a5ffee9e9df",
        position_manager: "0x7a4a5c919ae2541aed11041a1aeee68f1287f95b",
        state_view: Some("0xd13dd3d6e93f276fafc9db9e6bb47c1180aee0c4"),
        vault: None,
    },
    Deployment {
        chain_id: chains::ETHEREUM,
        protocol: ProtocolFamily::Uniswap,
        pool_manager: "0x000000000004444c5dc75cb358380d2e3de08a90",
        position_manager: "0xbd216513d74c8cf14cf4747e6aaa6420ff64ee9e",
        state_view: Some("0x7ffe42c4a5deea5b0fec41c94c136cf115597227"),
        vault: None,
    },
    Deployment {
        chain_id: chains::BASE,
        protocol: ProtocolFamily::Uniswap,
        pool_manager: "0x498581ff718922c3f8e6a244956af099b2652b2b",
        position_manager: "0x7c5f5a4bbd8fd63184577525326123b519429bdc",
        state_view: Some("0xa3c0c9b65bad0b08107aa264b0f3db444b867a71"),
        vault: None,
    },
    Deployment {
        chain_id: chains::BSC,
        protocol: ProtocolFamily::PancakeSwap,
        pool_manager: "0xa0FfB9c1CE1Fe56963B0321B32E7A0302114058b",
        position_manager: "0x55f4c8abA71A1e923edC303eb4fEfF14608cC226",
        state_view: None,
        vault: Some("0x238a358808379702088667322f80aC48bAd5e6c4"),
    },
];

/// Look up the deployment for a chain and protocol family
pub fn deployment(chain_id: u64, protocol: ProtocolFamily) -> Option<Deployment> {
    DEPLOYMENTS
        .iter()
        .find(|d| d.chain_id == chain_id && d.protocol == protocol)
        .copied()
}

/// Etherscan-compatible explorer API used to enumerate position NFTs
pub fn explorer_api(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        chains::BSC => Some("https://api.bscscan.com/api"),
        chains::ETHEREUM => Some("https://api.etherscan.io/api"),
        chains::BASE => Some("https://base.blockscout.com/api"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_lookup() {
        let uni = deployment(chains::BSC, ProtocolFamily::Uniswap).unwrap();
        assert!(uni.state_view.is_some());
        assert_eq!(uni.permit2(), "0x000000000022D473030F116dDEE9F6B43aC78BA3");

        let pcs = deployment(chains::BSC, ProtocolFamily::PancakeSwap).unwrap();
        assert!(pcs.state_view.is_none());
        assert!(pcs.protocol.uses_alternate_pool_key());

        assert!(deployment(chains::BASE, ProtocolFamily::PancakeSwap).is_none());
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("Pancake".parse::<ProtocolFamily>(), Ok(ProtocolFamily::PancakeSwap));
        assert_eq!("uniswap".parse::<ProtocolFamily>(), Ok(ProtocolFamily::Uniswap));
        assert!("sushi".parse::<ProtocolFamily>().is_err());
    }
}
