//! # Approval State Machine
//!
//! ## Purpose
//!
//! Tokens reach the position manager through a two-hop allowance chain:
//! the ERC20 grants the Permit2 registry, and the registry grants the
//! position manager a bounded, expiring allowance. Each leg of a ladder
//! (quote currency first, then base) walks this chain independently.
//!
//! ## States
//!
//! ```text
//! Unapproved ──erc20 approve──▶ Erc20ApprovedToRegistry ──permit2 approve──▶ RegistryApprovedToConsumer
//!                                        ▲                                              │
//!                                        └──────────── permit2 approve ◀── Expired ◀────┘
//! ```
//!
//! A leg is only ready once a read-back shows a nonzero, unexpired
//! expiration and an amount covering the requirement.

use crate::errors::LadderError;
use crate::multicall::{BatchCall, BatchCallAggregator};
use crate::submit::{GasLimit, TransactionSubmitter, TxRequest};
use crate::{log_approval, log_success};
use dex::abi::erc20::{
    decode_permit2_allowance, decode_uint, encode_allowance, encode_approve, encode_permit2_allowance,
    encode_permit2_approve, max_uint160,
};
use dex::ApprovalRecord;
use ethers::types::{Address, H256, U256};
use ladder_config::service::gas;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Unapproved,
    Erc20ApprovedToRegistry,
    RegistryApprovedToConsumer,
    Expired,
}

impl ApprovalState {
    fn classify(erc20_allowance: U256, permit2: &ApprovalRecord, required: U256, now: u64) -> Self {
        if erc20_allowance < required {
            ApprovalState::Unapproved
        } else if permit2.expiration != 0 && permit2.is_expired(now) {
            ApprovalState::Expired
        } else if permit2.expiration != 0 && permit2.covers(required, now) {
            ApprovalState::RegistryApprovedToConsumer
        } else {
            ApprovalState::Erc20ApprovedToRegistry
        }
    }

    pub fn is_ready(self) -> bool {
        self == ApprovalState::RegistryApprovedToConsumer
    }
}

/// One token and the amount the ladder may pull of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalLeg {
    pub token: Address,
    pub required: U256,
}

impl ApprovalLeg {
    /// Requirements are never zero so an untouched token still needs a grant
    pub fn new(token: Address, required: U256) -> Self {
        Self {
            token,
            required: required.max(U256::one()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegStatus {
    pub token: Address,
    pub required: U256,
    pub erc20_allowance: U256,
    pub permit2_amount: U256,
    pub permit2_expiration: u64,
    pub state: ApprovalState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReport {
    pub checked_at: u64,
    pub legs: Vec<LegStatus>,
}

impl ApprovalReport {
    pub fn all_ready(&self) -> bool {
        self.legs.iter().all(|leg| leg.state.is_ready())
    }

    pub fn first_unready(&self) -> Option<&LegStatus> {
        self.legs.iter().find(|leg| !leg.state.is_ready())
    }
}

/// Transactions sent while driving legs to the ready state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalTransactions {
    pub erc20: Vec<H256>,
    pub permit2: Vec<H256>,
}

#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    pub permit2: Address,
    /// Contract the registry grants (the position manager)
    pub consumer: Address,
    pub expiration_days: u64,
    pub gas_buffer_percent: u64,
    pub receipt_timeout: Duration,
}

pub struct ApprovalStateMachine {
    aggregator: Arc<BatchCallAggregator>,
    submitter: Arc<TransactionSubmitter>,
    settings: ApprovalPolicy,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug)]
enum AllowanceRead {
    Erc20(U256),
    Permit2(ApprovalRecord),
}

impl ApprovalStateMachine {
    pub fn new(
        aggregator: Arc<BatchCallAggregator>,
        submitter: Arc<TransactionSubmitter>,
        settings: ApprovalPolicy,
    ) -> Self {
        Self {
            aggregator,
            submitter,
            settings,
        }
    }

    fn owner(&self) -> Address {
        self.submitter.sender()
    }

    /// Read both hops for every leg in one batch
    pub async fn inspect(&self, legs: &[ApprovalLeg]) -> Result<ApprovalReport, LadderError> {
        let owner = self.owner();
        let mut calls = Vec::with_capacity(legs.len() * 2);
        for leg in legs {
            calls.push(BatchCall::new(
                leg.token,
                encode_allowance(owner, self.settings.permit2),
                "allowance",
                |data| decode_uint(data).map(AllowanceRead::Erc20),
            ));
            calls.push(BatchCall::new(
                self.settings.permit2,
                encode_permit2_allowance(owner, leg.token, self.settings.consumer),
                "permit2.allowance",
                |data| decode_permit2_allowance(data).map(AllowanceRead::Permit2),
            ));
        }

        let results = self.aggregator.execute(calls).await?;
        let now = unix_now();

        let mut statuses = Vec::with_capacity(legs.len());
        for (leg, pair) in legs.iter().zip(results.chunks(2)) {
            let erc20_allowance = match pair.first() {
                Some(Some(AllowanceRead::Erc20(amount))) => *amount,
                _ => U256::zero(),
            };
            let permit2 = match pair.get(1) {
                Some(Some(AllowanceRead::Permit2(record))) => *record,
                _ => ApprovalRecord::default(),
            };
            statuses.push(LegStatus {
                token: leg.token,
                required: leg.required,
                erc20_allowance,
                permit2_amount: permit2.amount,
                permit2_expiration: permit2.expiration,
                state: ApprovalState::classify(erc20_allowance, &permit2, leg.required, now),
            });
        }

        Ok(ApprovalReport {
            checked_at: now,
            legs: statuses,
        })
    }

    /// Read-only check; fails naming the first leg that is not ready
    pub async fn verify(&self, legs: &[ApprovalLeg]) -> Result<ApprovalReport, LadderError> {
        let report = self.inspect(legs).await?;
        if let Some(leg) = report.first_unready() {
            return Err(LadderError::Approval(format!(
                "token {:?} is {:?}: erc20 allowance {}, permit2 amount {} expiring {}, need {}",
                leg.token, leg.state, leg.erc20_allowance, leg.permit2_amount, leg.permit2_expiration, leg.required
            )));
        }
        log_success!("approvals verified for {} token(s)", legs.len());
        Ok(report)
    }

    /// Drive every leg to the ready state. The ERC20 hop is only sent when
    /// short; the registry grant is always renewed since it expires silently.
    pub async fn ensure(&self, legs: &[ApprovalLeg]) -> Result<(ApprovalReport, ApprovalTransactions), LadderError> {
        let before = self.inspect(legs).await?;
        let mut sent = ApprovalTransactions::default();

        for status in &before.legs {
            if status.state.is_ready() {
                log_approval!("{:?} looks approved, renewing registry grant", status.token);
            }
            self.advance(status, &mut sent).await.map_err(approval_failure)?;
        }

        let after = self.inspect(legs).await?;
        for status in &after.legs {
            let now = after.checked_at;
            if status.permit2_expiration == 0 {
                return Err(LadderError::Approval(format!(
                    "permit2 read-back for {:?} shows no grant",
                    status.token
                )));
            }
            if status.permit2_expiration <= now {
                return Err(LadderError::Approval(format!(
                    "permit2 read-back for {:?} expired at {}",
                    status.token, status.permit2_expiration
                )));
            }
            if status.permit2_amount < status.required {
                return Err(LadderError::Approval(format!(
                    "permit2 read-back for {:?} grants {}, need {}",
                    status.token, status.permit2_amount, status.required
                )));
            }
            if status.erc20_allowance < status.required {
                return Err(LadderError::Approval(format!(
                    "erc20 allowance for {:?} is {}, need {}",
                    status.token, status.erc20_allowance, status.required
                )));
            }
        }
        log_success!(
            "approvals ready ({} erc20, {} permit2 transaction(s))",
            sent.erc20.len(),
            sent.permit2.len()
        );
        Ok((after, sent))
    }

    async fn advance(&self, status: &LegStatus, sent: &mut ApprovalTransactions) -> Result<(), LadderError> {
        let timeout = self.settings.receipt_timeout;
        let multiplier = 100 + self.settings.gas_buffer_percent;

        if status.state == ApprovalState::Unapproved {
            log_approval!("approving Permit2 to spend {:?}", status.token);
            let request = TxRequest::new(
                status.token,
                encode_approve(self.settings.permit2, U256::MAX),
                GasLimit::Estimate {
                    multiplier_percent: multiplier,
                    fallback: Some(gas::APPROVE),
                },
                "erc20 approve",
            );
            let tx = self.submitter.submit(request, timeout).await?;
            sent.erc20.push(tx.tx_hash);
        }

        let expiration = unix_now() + self.settings.expiration_days * SECONDS_PER_DAY;
        log_approval!(
            "granting {:?} on Permit2 for {:?} until {}",
            self.settings.consumer,
            status.token,
            expiration
        );
        let request = TxRequest::new(
            self.settings.permit2,
            encode_permit2_approve(status.token, self.settings.consumer, max_uint160(), expiration),
            GasLimit::Estimate {
                multiplier_percent: multiplier,
                fallback: Some(gas::PERMIT2_APPROVE),
            },
            "permit2 approve",
        );
        let tx = self.submitter.submit(request, timeout).await?;
        sent.permit2.push(tx.tx_hash);
        Ok(())
    }
}

/// Write failures during approval surface as approval errors; timeouts and
/// transport faults keep their own kind
fn approval_failure(e: LadderError) -> LadderError {
    match e {
        LadderError::OnChainRevert { tx_hash, .. } => {
            LadderError::Approval(format!("approval transaction {tx_hash:?} reverted"))
        }
        LadderError::SimulationFailure(reason) | LadderError::Submission(reason) => {
            warn!(%reason, "approval transaction failed");
            LadderError::Approval(reason)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: u64, expiration: u64) -> ApprovalRecord {
        ApprovalRecord {
            amount: U256::from(amount),
            expiration,
            nonce: 0,
        }
    }

    #[test]
    fn test_classification() {
        let now = 1_000;
        let need = U256::from(50u64);

        assert_eq!(
            ApprovalState::classify(U256::zero(), &record(100, 2_000), need, now),
            ApprovalState::Unapproved
        );
        assert_eq!(
            ApprovalState::classify(U256::MAX, &record(0, 0), need, now),
            ApprovalState::Erc20ApprovedToRegistry
        );
        assert_eq!(
            ApprovalState::classify(U256::MAX, &record(100, 999), need, now),
            ApprovalState::Expired
        );
        assert_eq!(
            ApprovalState::classify(U256::MAX, &record(10, 2_000), need, now),
            ApprovalState::Erc20ApprovedToRegistry
        );
        assert_eq!(
            ApprovalState::classify(U256::MAX, &record(100, 2_000), need, now),
            ApprovalState::RegistryApprovedToConsumer
        );
    }

    #[test]
    fn test_zero_requirement_still_needs_grant() {
        let leg = ApprovalLeg::new(Address::from_low_u64_be(1), U256::zero());
        assert_eq!(leg.required, U256::one());
    }

    #[test]
    fn test_failure_mapping() {
        let mapped = approval_failure(LadderError::SimulationFailure("reverted".into()));
        assert!(matches!(mapped, LadderError::Approval(_)));

        let timeout = LadderError::Timeout {
            tx_hash: H256::zero(),
            waited_secs: 5,
        };
        assert!(matches!(approval_failure(timeout), LadderError::Timeout { .. }));
    }
}
