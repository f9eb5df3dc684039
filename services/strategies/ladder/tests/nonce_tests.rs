//! Nonce ledger behaviour under concurrency and partial failure

use ethers::types::Address;
use ladder_strategy::testing::MockChain;
use ladder_strategy::NonceSequencer;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn sequencer(chain: Arc<MockChain>) -> Arc<NonceSequencer> {
    Arc::new(NonceSequencer::new(
        Address::from_low_u64_be(0x77),
        chain,
        Duration::from_secs(3_600),
    ))
}

#[tokio::test]
async fn test_concurrent_allocations_are_distinct_and_contiguous() {
    let chain = Arc::new(MockChain::new());
    chain.set_pending_nonce(100);
    let nonces = sequencer(chain);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let nonces = nonces.clone();
            tokio::spawn(async move { nonces.allocate().await })
        })
        .collect();

    let mut allocated = BTreeSet::new();
    for handle in handles {
        let nonce = handle.await.unwrap().unwrap();
        assert!(allocated.insert(nonce), "nonce {nonce} handed out twice");
    }

    assert_eq!(allocated, (100..120).collect::<BTreeSet<u64>>());
    let snapshot = nonces.snapshot().await;
    assert_eq!(snapshot.current, Some(120));
    assert_eq!(snapshot.outstanding.len(), 20);
}

#[tokio::test]
async fn test_release_in_the_middle_keeps_cursor() {
    let chain = Arc::new(MockChain::new());
    chain.set_pending_nonce(100);
    let nonces = sequencer(chain);

    for expected in 100..103 {
        assert_eq!(nonces.allocate().await.unwrap(), expected);
    }
    nonces.release(101).await;

    let snapshot = nonces.snapshot().await;
    assert_eq!(snapshot.outstanding, vec![100, 102]);
    assert_eq!(nonces.allocate().await.unwrap(), 103);
}

#[tokio::test]
async fn test_release_at_tail_reuses_nonce() {
    let chain = Arc::new(MockChain::new());
    chain.set_pending_nonce(7);
    let nonces = sequencer(chain);

    assert_eq!(nonces.allocate().await.unwrap(), 7);
    assert_eq!(nonces.allocate().await.unwrap(), 8);
    nonces.release(8).await;

    assert_eq!(nonces.snapshot().await.current, Some(8));
    assert_eq!(nonces.allocate().await.unwrap(), 8);
}

#[tokio::test]
async fn test_confirm_clears_outstanding_without_moving_cursor() {
    let chain = Arc::new(MockChain::new());
    let nonces = sequencer(chain);

    let first = nonces.allocate().await.unwrap();
    let second = nonces.allocate().await.unwrap();
    nonces.confirm(first).await;

    let snapshot = nonces.snapshot().await;
    assert_eq!(snapshot.outstanding, vec![second]);
    assert_eq!(snapshot.current, Some(2));
}

#[tokio::test]
async fn test_fresh_allocation_follows_chain_ahead_of_ledger() {
    let chain = Arc::new(MockChain::new());
    let nonces = sequencer(chain.clone());

    assert_eq!(nonces.allocate().await.unwrap(), 0);
    // another wallet instance used the same key
    chain.set_pending_nonce(5);

    assert_eq!(nonces.allocate().await.unwrap(), 1);
    assert_eq!(nonces.allocate_fresh().await.unwrap(), 5);

    // nonce 0 is below the chain's pending count, so it was mined
    let snapshot = nonces.snapshot().await;
    assert_eq!(snapshot.outstanding, vec![5]);
    assert_eq!(snapshot.current, Some(6));
}

#[tokio::test]
async fn test_reset_resyncs_from_chain() {
    let chain = Arc::new(MockChain::new());
    chain.set_pending_nonce(3);
    let nonces = sequencer(chain.clone());

    nonces.allocate().await.unwrap();
    nonces.reset().await;
    assert_eq!(nonces.snapshot().await.current, None);

    chain.set_pending_nonce(9);
    assert_eq!(nonces.allocate().await.unwrap(), 9);
}
