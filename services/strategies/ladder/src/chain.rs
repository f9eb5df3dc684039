//! # Chain Access - RPC and Signing Seams
//!
//! ## Purpose
//!
//! Narrow async interfaces over the JSON-RPC provider and the signing key so
//! every ladder component can run against a live node or an in-memory mock.
//!
//! ## Integration Points
//!
//! - **Provider**: `ethers` HTTP provider with a pooled `reqwest` client
//! - **Signer**: `LocalWallet` loaded from `LADDER_PRIVATE_KEY`
//! - **Consumers**: aggregator, submitter, nonce sequencer, position enumeration

use crate::errors::ChainError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::Http;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Environment variable holding the signing key
pub const PRIVATE_KEY_ENV: &str = "LADDER_PRIVATE_KEY";

/// Read and write access to one chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// `eth_call` against latest state
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, from: Address, to: Address, data: Bytes, value: U256) -> Result<U256, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// Transaction count including pending transactions
    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError>;

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError>;
}

/// Signs fully populated transactions
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// RLP-encoded signed transaction ready for `eth_sendRawTransaction`
    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, ChainError>;
}

/// [`ChainClient`] over an HTTP JSON-RPC endpoint
pub struct EthersChain {
    provider: Arc<Provider<Http>>,
}

impl EthersChain {
    /// Connect with a pooled HTTP client (keeps connections alive between
    /// the many small reads a ladder run performs)
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        let url: Url = rpc_url.parse().context("Invalid RPC URL")?;
        let provider = Provider::<Http>::new(Http::new_with_client(url, http_client));
        info!("🌐 Connected RPC provider: {}", rpc_url);

        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

#[async_trait]
impl ChainClient for EthersChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self.provider.get_chainid().await.map_err(ChainError::rpc)?;
        Ok(id.low_u64())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&tx, None).await.map_err(ChainError::rpc)
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: Bytes, value: U256) -> Result<U256, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .value(value)
            .into();
        self.provider.estimate_gas(&tx, None).await.map_err(ChainError::rpc)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.provider.get_gas_price().await.map_err(ChainError::rpc)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        let count = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(ChainError::rpc)?;
        Ok(count.low_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(ChainError::rpc)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ChainError> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ChainError::rpc)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let block = self.provider.get_block_number().await.map_err(ChainError::rpc)?;
        Ok(block.as_u64())
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        self.provider.get_logs(filter).await.map_err(ChainError::rpc)
    }
}

/// [`TransactionSigner`] over a local private key
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    pub fn from_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .context("Invalid private key format")?
            .with_chain_id(chain_id);
        Ok(Self { wallet })
    }

    /// Keys are only ever taken from the environment
    pub fn from_env(chain_id: u64) -> Result<Self> {
        let key = std::env::var(PRIVATE_KEY_ENV)
            .with_context(|| format!("{PRIVATE_KEY_ENV} is not set"))?;
        Self::from_key(&key, chain_id)
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, ChainError> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key, never funded on a real network
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_signer_address() {
        let signer = WalletSigner::from_key(DEV_KEY, 56).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(WalletSigner::from_key("not-a-key", 56).is_err());
    }

    #[tokio::test]
    async fn test_signed_transaction_is_rlp() {
        let signer = WalletSigner::from_key(DEV_KEY, 56).unwrap();
        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::from_low_u64_be(1))
            .nonce(0u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .chain_id(56)
            .into();
        let raw = signer.sign(&tx).await.unwrap();
        assert!(!raw.is_empty());
        // legacy transactions are an RLP list
        assert!(raw[0] >= 0xc0);
    }
}
