//! Well-known tokens
//!
//! Decimals for tokens that show up in nearly every ladder, used to pre-seed
//! the decimals cache, and the stablecoins that mark the quote leg of a pair.
//! Addresses are lowercase.

/// (address, decimals)
pub const KNOWN_DECIMALS: &[(&str, u8)] = &[
    // BSC
    ("0x55d398326f99059ff775485246999027b3197955", 18), // USDT
    ("0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", 18), // USDC
    ("0xe9e7cea3dedca5984780bafc599bd69add087d56", 18), // BUSD
    ("0x1af3f329e8be154074d8769d1ffa4ee058b1dbc3", 18), // DAI
    ("0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", 18), // WBNB
    // Base
    ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", 6), // USDC
    ("0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca", 6), // USDbC
    ("0x50c5725949a6f0c72e6c4a641f24049a917db0cb", 18), // DAI
    ("0x4200000000000000000000000000000000000006", 18), // WETH
    // Ethereum
    ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6), // USDC
    ("0xdac17f958d2ee523a2206206994597c13d831ec7", 6), // USDT
    ("0x6b175474e89094c44da98b954eedeac495271d0f", 18), // DAI
    ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", 18), // WETH
];

pub const STABLECOINS: &[&str] = &[
    "0x55d398326f99059ff775485246999027b3197955",
    "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d",
    "0xe9e7cea3dedca5984780bafc599bd69add087d56",
    "0x1af3f329e8be154074d8769d1ffa4ee058b1dbc3",
    "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
    "0xd9aaec86b65d86f6a7b5b1b0c42ffa531710b6ca",
    "0x50c5725949a6f0c72e6c4a641f24049a917db0cb",
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
    "0xdac17f958d2ee523a2206206994597c13d831ec7",
    "0x6b175474e89094c44da98b954eedeac495271d0f",
];

/// Case-insensitive stablecoin check
pub fn is_stablecoin(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    STABLECOINS.contains(&lower.as_str())
}

pub fn known_decimals(address: &str) -> Option<u8> {
    let lower = address.to_ascii_lowercase();
    KNOWN_DECIMALS
        .iter()
        .find(|(addr, _)| *addr == lower)
        .map(|(_, decimals)| *decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(is_stablecoin("0x55d398326f99059fF775485246999027B3197955"));
        assert_eq!(known_decimals("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), Some(6));
        assert_eq!(known_decimals("0x0000000000000000000000000000000000000001"), None);
        assert!(!is_stablecoin("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"));
    }

    #[test]
    fn test_every_stablecoin_has_known_decimals() {
        for coin in STABLECOINS {
            assert!(known_decimals(coin).is_some(), "{coin}");
        }
    }
}
