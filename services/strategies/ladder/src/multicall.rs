//! # Batch Call Aggregator
//!
//! ## Purpose
//!
//! Collapses many independent read-only calls into one Multicall3
//! `aggregate3` round trip and hands back one typed result per call, in
//! input order.
//!
//! ## Failure Handling
//!
//! - every sub-call goes out with `allowFailure = true`; strictness is
//!   enforced here so one bad slot cannot revert the whole batch
//! - a failed strict call surfaces as [`ChainError::CallFailed`] naming the slot
//! - a failed optional call, or one whose data does not decode, yields `None`
//! - if the aggregator itself fails the batch is replayed call by call

use crate::chain::ChainClient;
use crate::errors::{ChainError, LadderError};
use dex::abi::multicall::{decode_aggregate3, encode_aggregate3};
use dex::{Call3, CallResult, DecodingError};
use ethers::types::{Address, Bytes};
use std::sync::Arc;
use tracing::{debug, warn};

type Decoder<T> = Box<dyn Fn(&[u8]) -> Result<T, DecodingError> + Send + Sync>;

/// One read in a batch together with its result decoder
pub struct BatchCall<T> {
    pub target: Address,
    pub call_data: Vec<u8>,
    /// Optional calls may fail without failing the batch
    pub allow_failure: bool,
    pub label: String,
    decoder: Decoder<T>,
}

impl<T> BatchCall<T> {
    pub fn new<F>(target: Address, call_data: Vec<u8>, label: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, DecodingError> + Send + Sync + 'static,
    {
        Self {
            target,
            call_data,
            allow_failure: false,
            label: label.into(),
            decoder: Box::new(decoder),
        }
    }

    pub fn optional(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    fn settle(&self, slot: usize, result: CallResult) -> Result<Option<T>, ChainError> {
        if !result.success {
            if self.allow_failure {
                debug!(slot, label = %self.label, "optional call failed");
                return Ok(None);
            }
            return Err(ChainError::CallFailed {
                slot,
                label: self.label.clone(),
            });
        }
        match (self.decoder)(&result.return_data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(slot, label = %self.label, error = %e, "call result did not decode");
                Ok(None)
            }
        }
    }
}

pub struct BatchCallAggregator {
    chain: Arc<dyn ChainClient>,
    multicall: Address,
}

impl BatchCallAggregator {
    pub fn new(chain: Arc<dyn ChainClient>, multicall: Address) -> Self {
        Self { chain, multicall }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    /// Execute `calls` and return one result per call in input order
    pub async fn execute<T>(&self, calls: Vec<BatchCall<T>>) -> Result<Vec<Option<T>>, LadderError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let results = match self.aggregate(&calls).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, calls = calls.len(), "aggregate3 failed, replaying calls individually");
                self.replay(&calls).await
            }
        };

        let mut out = Vec::with_capacity(calls.len());
        for (slot, (call, result)) in calls.iter().zip(results).enumerate() {
            out.push(call.settle(slot, result)?);
        }
        Ok(out)
    }

    async fn aggregate<T>(&self, calls: &[BatchCall<T>]) -> Result<Vec<CallResult>, ChainError> {
        let encoded: Vec<Call3> = calls
            .iter()
            .map(|c| Call3::new(c.target, c.call_data.clone()))
            .collect();
        let response = self
            .chain
            .call(self.multicall, Bytes::from(encode_aggregate3(&encoded)))
            .await?;
        let results = decode_aggregate3(&response).map_err(|e| ChainError::Decode(e.to_string()))?;
        if results.len() != calls.len() {
            return Err(ChainError::Decode(format!(
                "aggregate3 returned {} results for {} calls",
                results.len(),
                calls.len()
            )));
        }
        Ok(results)
    }

    async fn replay<T>(&self, calls: &[BatchCall<T>]) -> Vec<CallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self
                .chain
                .call(call.target, Bytes::from(call.call_data.clone()))
                .await
            {
                Ok(data) => CallResult {
                    success: true,
                    return_data: data.to_vec(),
                },
                Err(e) => {
                    debug!(label = %call.label, error = %e, "individual call failed");
                    CallResult {
                        success: false,
                        return_data: Vec::new(),
                    }
                }
            };
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use dex::abi::erc20::{decode_uint, encode_balance_of, BALANCE_OF};
    use ethers::types::U256;

    fn token(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn balance_call(token: Address, owner: Address) -> BatchCall<U256> {
        BatchCall::new(token, encode_balance_of(owner), "balanceOf", decode_uint)
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_call() {
        let chain = Arc::new(MockChain::new());
        let aggregator = BatchCallAggregator::new(chain.clone(), token(0xca11));

        let out = aggregator.execute::<U256>(Vec::new()).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(chain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_results_in_input_order() {
        let chain = Arc::new(MockChain::new());
        let owner = token(0x42);
        chain.set_uint(token(1), BALANCE_OF.short_signature(), U256::from(10u64));
        chain.set_uint(token(2), BALANCE_OF.short_signature(), U256::from(20u64));
        let aggregator = BatchCallAggregator::new(chain.clone(), chain.multicall_address());

        let out = aggregator
            .execute(vec![balance_call(token(2), owner), balance_call(token(1), owner)])
            .await
            .unwrap();
        assert_eq!(out, vec![Some(U256::from(20u64)), Some(U256::from(10u64))]);
        // one aggregate round trip
        assert_eq!(chain.call_count(), 1);
    }

    #[tokio::test]
    async fn test_strict_failure_names_slot() {
        let chain = Arc::new(MockChain::new());
        let owner = token(0x42);
        chain.set_uint(token(1), BALANCE_OF.short_signature(), U256::one());
        let aggregator = BatchCallAggregator::new(chain.clone(), chain.multicall_address());

        let err = aggregator
            .execute(vec![balance_call(token(1), owner), balance_call(token(9), owner)])
            .await
            .unwrap_err();
        assert!(matches!(err, LadderError::Chain(ChainError::CallFailed { slot: 1, .. })));
    }

    #[tokio::test]
    async fn test_optional_failure_is_none() {
        let chain = Arc::new(MockChain::new());
        let owner = token(0x42);
        chain.set_uint(token(1), BALANCE_OF.short_signature(), U256::one());
        let aggregator = BatchCallAggregator::new(chain.clone(), chain.multicall_address());

        let out = aggregator
            .execute(vec![
                balance_call(token(9), owner).optional(),
                balance_call(token(1), owner),
            ])
            .await
            .unwrap();
        assert_eq!(out, vec![None, Some(U256::one())]);
    }

    #[tokio::test]
    async fn test_falls_back_to_individual_calls() {
        let chain = Arc::new(MockChain::new());
        let owner = token(0x42);
        chain.set_uint(token(1), BALANCE_OF.short_signature(), U256::from(5u64));
        chain.set_uint(token(2), BALANCE_OF.short_signature(), U256::from(6u64));
        chain.disable_multicall();
        let aggregator = BatchCallAggregator::new(chain.clone(), chain.multicall_address());

        let out = aggregator
            .execute(vec![balance_call(token(1), owner), balance_call(token(2), owner)])
            .await
            .unwrap();
        assert_eq!(out, vec![Some(U256::from(5u64)), Some(U256::from(6u64))]);
        // failed aggregate plus two replays
        assert_eq!(chain.call_count(), 3);
    }
}
