//! # Nonce Sequencer - Gap-Free Transaction Ordering
//!
//! ## Purpose
//!
//! Hands out transaction nonces for one signing identity to any number of
//! concurrent callers. Every nonce handed out is either confirmed (a receipt
//! exists, success or revert) or released (the network never accepted it), so
//! a failure before broadcast never leaves a permanent gap.
//!
//! ## Ledger Rules
//!
//! - `allocate` resyncs from the chain's pending count when the ledger is
//!   unset, stale, or a resync is forced; entries the chain has already mined
//!   are dropped and the cursor never moves backwards
//! - `release` of the most recent allocation rolls the cursor back
//! - all state lives behind one mutex

use crate::chain::ChainClient;
use crate::errors::LadderError;
use crate::log_nonce;
use ethers::types::Address;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct NonceLedger {
    current: Option<u64>,
    outstanding: BTreeSet<u64>,
    last_resync: Option<Instant>,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceSnapshot {
    pub current: Option<u64>,
    pub outstanding: Vec<u64>,
}

pub struct NonceSequencer {
    address: Address,
    chain: Arc<dyn ChainClient>,
    resync_interval: Duration,
    ledger: Mutex<NonceLedger>,
}

impl NonceSequencer {
    pub fn new(address: Address, chain: Arc<dyn ChainClient>, resync_interval: Duration) -> Self {
        Self {
            address,
            chain,
            resync_interval,
            ledger: Mutex::new(NonceLedger::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Next nonce, resyncing first when due
    pub async fn allocate(&self) -> Result<u64, LadderError> {
        self.allocate_inner(false).await
    }

    /// Next nonce after an unconditional resync
    pub async fn allocate_fresh(&self) -> Result<u64, LadderError> {
        self.allocate_inner(true).await
    }

    async fn allocate_inner(&self, force_resync: bool) -> Result<u64, LadderError> {
        let mut ledger = self.ledger.lock().await;

        let stale = ledger
            .last_resync
            .map_or(true, |at| at.elapsed() >= self.resync_interval);
        if ledger.current.is_none() || stale || force_resync {
            self.resync_locked(&mut ledger).await?;
        }

        let nonce = ledger.current.unwrap_or_default();
        ledger.current = Some(nonce + 1);
        ledger.outstanding.insert(nonce);
        log_nonce!("allocated nonce {} ({} outstanding)", nonce, ledger.outstanding.len());
        Ok(nonce)
    }

    async fn resync_locked(&self, ledger: &mut NonceLedger) -> Result<(), LadderError> {
        let chain_nonce = self.chain.pending_nonce(self.address).await?;

        let mined: Vec<u64> = ledger.outstanding.range(..chain_nonce).copied().collect();
        for nonce in &mined {
            ledger.outstanding.remove(nonce);
        }
        if !mined.is_empty() {
            debug!(count = mined.len(), "dropped nonces the chain already consumed");
        }

        let tracked = ledger.current.unwrap_or(chain_nonce);
        if tracked < chain_nonce {
            warn!(tracked, chain_nonce, "nonce ledger behind chain, advancing");
        }
        ledger.current = Some(tracked.max(chain_nonce));
        ledger.last_resync = Some(Instant::now());
        Ok(())
    }

    /// The transaction using `nonce` has a receipt (success or revert)
    pub async fn confirm(&self, nonce: u64) {
        let mut ledger = self.ledger.lock().await;
        ledger.outstanding.remove(&nonce);
        log_nonce!("confirmed nonce {}", nonce);
    }

    /// The transaction using `nonce` never reached the network
    pub async fn release(&self, nonce: u64) {
        let mut ledger = self.ledger.lock().await;
        ledger.outstanding.remove(&nonce);
        if ledger.current == Some(nonce + 1) {
            ledger.current = Some(nonce);
            log_nonce!("released tail nonce {}, cursor rolled back", nonce);
        } else {
            log_nonce!("released nonce {}", nonce);
        }
    }

    /// Forget everything; the next allocation resyncs
    pub async fn reset(&self) {
        let mut ledger = self.ledger.lock().await;
        *ledger = NonceLedger::default();
    }

    pub async fn snapshot(&self) -> NonceSnapshot {
        let ledger = self.ledger.lock().await;
        NonceSnapshot {
            current: ledger.current,
            outstanding: ledger.outstanding.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    fn sequencer(chain: Arc<MockChain>) -> NonceSequencer {
        NonceSequencer::new(Address::from_low_u64_be(0x42), chain, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_release_in_middle_keeps_cursor() {
        let chain = Arc::new(MockChain::new());
        chain.set_pending_nonce(100);
        let nonces = sequencer(chain);

        assert_eq!(nonces.allocate().await.unwrap(), 100);
        assert_eq!(nonces.allocate().await.unwrap(), 101);
        assert_eq!(nonces.allocate().await.unwrap(), 102);

        nonces.release(101).await;
        let snapshot = nonces.snapshot().await;
        assert_eq!(snapshot.outstanding, vec![100, 102]);
        assert_eq!(snapshot.current, Some(103));

        assert_eq!(nonces.allocate().await.unwrap(), 103);
    }

    #[tokio::test]
    async fn test_tail_release_reclaims() {
        let chain = Arc::new(MockChain::new());
        chain.set_pending_nonce(7);
        let nonces = sequencer(chain);

        let first = nonces.allocate().await.unwrap();
        nonces.release(first).await;
        assert_eq!(nonces.allocate().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_forced_resync_drops_mined() {
        let chain = Arc::new(MockChain::new());
        chain.set_pending_nonce(5);
        let nonces = sequencer(chain.clone());

        assert_eq!(nonces.allocate().await.unwrap(), 5);
        assert_eq!(nonces.allocate().await.unwrap(), 6);

        // both landed and an external wallet sent two more
        chain.set_pending_nonce(9);
        assert_eq!(nonces.allocate_fresh().await.unwrap(), 9);
        assert_eq!(nonces.snapshot().await.outstanding, vec![9]);
    }

    #[tokio::test]
    async fn test_reset_and_confirm() {
        let chain = Arc::new(MockChain::new());
        chain.set_pending_nonce(3);
        let nonces = sequencer(chain);

        let n = nonces.allocate().await.unwrap();
        nonces.confirm(n).await;
        assert!(nonces.snapshot().await.outstanding.is_empty());

        nonces.reset().await;
        assert_eq!(nonces.snapshot().await.current, None);
        assert_eq!(nonces.allocate().await.unwrap(), 3);
    }
}
