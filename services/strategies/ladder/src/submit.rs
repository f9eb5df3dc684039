//! # Transaction Submitter
//!
//! ## Purpose
//!
//! Turns a call (target, data, value, gas policy) into a mined receipt while
//! keeping the nonce ledger honest.
//!
//! ## Lifecycle
//!
//! 1. resolve gas (fixed, or estimate times a multiplier with an optional fallback)
//! 2. allocate a nonce
//! 3. sign and broadcast; on failure the nonce is released
//! 4. poll for the receipt under a timeout; a receipt confirms the nonce,
//!    a timeout leaves it outstanding since the transaction may still land
//!
//! Gas is resolved before a nonce is taken, so a call that fails simulation
//! never consumes one.

use crate::chain::{ChainClient, TransactionSigner};
use crate::errors::LadderError;
use crate::logging::LogEmoji;
use crate::nonce::NonceSequencer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Gas limit policy for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasLimit {
    Fixed(U256),
    /// `estimate * multiplier_percent / 100`; `fallback` applies when the
    /// estimate fails, otherwise the failure is a simulation failure
    Estimate {
        multiplier_percent: u64,
        fallback: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct TxRequest {
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas: GasLimit,
    /// Short name for logs
    pub label: String,
}

impl TxRequest {
    pub fn new(to: Address, data: Vec<u8>, gas: GasLimit, label: impl Into<String>) -> Self {
        Self {
            to,
            data,
            value: U256::zero(),
            gas,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub tx_hash: H256,
    pub receipt: TransactionReceipt,
    pub gas_used: Option<U256>,
    pub nonce: u64,
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    nonces: Arc<NonceSequencer>,
    chain_id: u64,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        nonces: Arc<NonceSequencer>,
        chain_id: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            signer,
            nonces,
            chain_id,
            poll_interval,
        }
    }

    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    pub fn nonces(&self) -> &Arc<NonceSequencer> {
        &self.nonces
    }

    /// Estimate gas for a call from the signer
    pub async fn estimate(&self, to: Address, data: &[u8], value: U256) -> Result<U256, LadderError> {
        self.chain
            .estimate_gas(self.sender(), to, Bytes::from(data.to_vec()), value)
            .await
            .map_err(|e| LadderError::SimulationFailure(e.to_string()))
    }

    /// Gas limit for a request without touching the nonce ledger
    pub async fn resolve_gas(&self, request: &TxRequest) -> Result<U256, LadderError> {
        match request.gas {
            GasLimit::Fixed(limit) => Ok(limit),
            GasLimit::Estimate {
                multiplier_percent,
                fallback,
            } => match self.estimate(request.to, &request.data, request.value).await {
                Ok(estimate) => {
                    let limit = estimate * U256::from(multiplier_percent) / U256::from(100u64);
                    debug!("{} {} gas estimate {} -> limit {}", LogEmoji::GAS, request.label, estimate, limit);
                    Ok(limit)
                }
                Err(e) => match fallback {
                    Some(fallback) => {
                        warn!(label = %request.label, error = %e, fallback, "gas estimate failed, using fallback");
                        Ok(U256::from(fallback))
                    }
                    None => Err(e),
                },
            },
        }
    }

    /// Sign, broadcast and wait for the receipt
    pub async fn submit(&self, request: TxRequest, receipt_timeout: Duration) -> Result<SubmittedTx, LadderError> {
        let gas = self.resolve_gas(&request).await?;
        let gas_price = self.chain.gas_price().await?;
        let nonce = self.nonces.allocate().await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.sender())
            .to(request.to)
            .data(request.data.clone())
            .value(request.value)
            .gas(gas)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into();

        let tx_hash = match self.broadcast(&tx).await {
            Ok(hash) => hash,
            Err(e) => {
                self.nonces.release(nonce).await;
                return Err(e);
            }
        };
        info!(
            "{} {} sent: {:?} (nonce {}, gas {})",
            LogEmoji::EXECUTE,
            request.label,
            tx_hash,
            nonce,
            gas
        );

        let receipt = match self.wait_for_receipt(tx_hash, receipt_timeout).await {
            Some(receipt) => receipt,
            None => {
                warn!(
                    "{} {} no receipt for {:?} after {}s, nonce {} left outstanding",
                    LogEmoji::CLOCK,
                    request.label,
                    tx_hash,
                    receipt_timeout.as_secs(),
                    nonce
                );
                return Err(LadderError::Timeout {
                    tx_hash,
                    waited_secs: receipt_timeout.as_secs(),
                });
            }
        };
        self.nonces.confirm(nonce).await;

        let gas_used = receipt.gas_used;
        if receipt.status == Some(U64::zero()) {
            warn!("{} {} reverted on chain: {:?}", LogEmoji::ERROR, request.label, tx_hash);
            return Err(LadderError::OnChainRevert { tx_hash, gas_used });
        }

        info!(
            "{} {} confirmed in block {}: {:?}",
            LogEmoji::SUCCESS,
            request.label,
            receipt.block_number.unwrap_or_default(),
            tx_hash
        );
        Ok(SubmittedTx {
            tx_hash,
            receipt,
            gas_used,
            nonce,
        })
    }

    async fn broadcast(&self, tx: &TypedTransaction) -> Result<H256, LadderError> {
        let raw = self
            .signer
            .sign(tx)
            .await
            .map_err(|e| LadderError::Submission(e.to_string()))?;
        self.chain
            .send_raw_transaction(raw)
            .await
            .map_err(|e| LadderError::Submission(e.to_string()))
    }

    async fn wait_for_receipt(&self, tx_hash: H256, limit: Duration) -> Option<TransactionReceipt> {
        let started = Instant::now();
        let poll = async {
            loop {
                match self.chain.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => warn!("Error checking transaction receipt: {}", e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        let receipt = timeout(limit, poll).await.ok();
        debug!(?tx_hash, waited_ms = started.elapsed().as_millis() as u64, "receipt wait finished");
        receipt
    }
}
