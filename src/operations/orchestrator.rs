//! Buyer and seller step machine.
//!
//! # Responsibilities
//! - Drive the buyer through create, resolve id, fund, approve and verify
//! - Persist the slot after every successful step, before reporting success
//! - Answer seller status checks and submit claims
//! - Resume or discard a persisted slot on startup
//!
//! Failed steps never touch the slot; the previous phase stays in place.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use crate::blockchain::contract::{approveReleaseCall, createEscrowCall, fundCall, resolveDisputeCall};
use crate::blockchain::{ChainClient, EscrowRecord, EventAwaiter, TxSubmitter, Wallet};
use crate::config::EscrowConfig;
use crate::error::{EscrowError, EscrowResult};
use crate::observability::metrics;
use crate::operations::state::{OperationState, Phase};
use crate::storage::{CompletedIds, KeyValueStore};

/// Outcome of a persisted buyer step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub phase: Phase,
    pub tx_hash: Option<TxHash>,
    pub record_id: Option<u64>,
    pub message: String,
    /// How long the caller should wait before the next step. Advisory only.
    pub grace: Option<Duration>,
}

impl StepReport {
    fn from_state(state: &OperationState, grace: Option<Duration>) -> Self {
        Self {
            phase: state.phase,
            tx_hash: state.last_tx,
            record_id: state.record_id,
            message: state.status_message.clone(),
            grace,
        }
    }
}

/// Result of `verify_completion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verification {
    /// Release observed on chain; the slot was cleared by this call.
    Completed,
    /// No approval on chain yet; the slot is unchanged.
    Pending,
    /// Nothing in flight; no chain read was made.
    AlreadyCleared,
}

/// Seller view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SellerStatus {
    NotFunded,
    AwaitingBuyerApproval,
    ReadyToClaim,
    Released,
}

impl SellerStatus {
    pub fn from_record(record: &EscrowRecord) -> Self {
        if record.is_released() {
            SellerStatus::Released
        } else if !record.funded {
            SellerStatus::NotFunded
        } else if record.approval_count == 0 {
            SellerStatus::AwaitingBuyerApproval
        } else {
            SellerStatus::ReadyToClaim
        }
    }
}

/// Buyer view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuyerStatus {
    AwaitingFunding,
    AwaitingApproval,
    Finalized,
    Unknown,
}

impl BuyerStatus {
    pub fn from_record(record: &EscrowRecord) -> Self {
        if record.has_approval() {
            BuyerStatus::Finalized
        } else if record.funded {
            BuyerStatus::AwaitingApproval
        } else if record.amount_wei.is_zero() {
            BuyerStatus::AwaitingFunding
        } else {
            BuyerStatus::Unknown
        }
    }
}

/// A unit of work for [`Orchestrator::spawn_step`].
///
/// Holds key material, so it is not `Debug`.
#[derive(Clone)]
pub enum Step {
    Create { key: String, seller: Address },
    ResolveId { tx_hash: TxHash },
    Fund { key: String, record_id: u64, amount_wei: U256 },
    Approve { key: String, record_id: u64 },
    Verify { record_id: u64 },
    Claim { key: String, record_id: u64 },
    Adopt { key: String, record_id: u64 },
    ResolveDispute { platform_key: String, record_id: u64, refund_buyer: bool },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Create { .. } => "create",
            Step::ResolveId { .. } => "resolve_id",
            Step::Fund { .. } => "fund",
            Step::Approve { .. } => "approve",
            Step::Verify { .. } => "verify",
            Step::Claim { .. } => "claim",
            Step::Adopt { .. } => "adopt",
            Step::ResolveDispute { .. } => "resolve_dispute",
        }
    }
}

/// What a spawned step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Report(StepReport),
    RecordId(u64),
    Verification(Verification),
    Submitted(TxHash),
}

/// Drives escrow operations for one local identity.
#[derive(Clone)]
pub struct Orchestrator {
    identity: String,
    chain: Arc<dyn ChainClient>,
    submitter: TxSubmitter,
    awaiter: EventAwaiter,
    store: Arc<dyn KeyValueStore>,
    completed: CompletedIds,
    step_lock: Arc<Mutex<()>>,
    create_grace: Duration,
    fund_grace: Duration,
}

impl Orchestrator {
    pub fn new(
        identity: impl Into<String>,
        chain: Arc<dyn ChainClient>,
        submitter: TxSubmitter,
        awaiter: EventAwaiter,
        store: Arc<dyn KeyValueStore>,
        completed: CompletedIds,
    ) -> Self {
        Self {
            identity: identity.into(),
            chain,
            submitter,
            awaiter,
            store,
            completed,
            step_lock: Arc::new(Mutex::new(())),
            create_grace: Duration::from_secs(15),
            fund_grace: Duration::from_secs(19),
        }
    }

    /// Build the submitter and awaiter from configuration.
    pub fn from_config(
        identity: impl Into<String>,
        chain: Arc<dyn ChainClient>,
        config: &EscrowConfig,
        store: Arc<dyn KeyValueStore>,
        completed: CompletedIds,
    ) -> EscrowResult<Self> {
        let submitter = TxSubmitter::from_config(chain.clone(), &config.chain)?;
        let awaiter = EventAwaiter::from_config(chain.clone(), &config.orchestrator);
        Ok(Self::new(identity, chain, submitter, awaiter, store, completed).with_grace(
            Duration::from_secs(config.orchestrator.create_grace_secs),
            Duration::from_secs(config.orchestrator.fund_grace_secs),
        ))
    }

    pub fn with_grace(mut self, create: Duration, fund: Duration) -> Self {
        self.create_grace = create;
        self.fund_grace = fund;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn completed_ids(&self) -> &CompletedIds {
        &self.completed
    }

    // ---- buyer flow ----

    /// Submit `createEscrow(self, seller)` and move to AWAITING_ID.
    pub async fn create_escrow(&self, key: &str, seller: Address) -> EscrowResult<StepReport> {
        let _guard = self.step_lock.lock().await;
        let wallet = Wallet::from_private_key(key)?;
        if seller == wallet.address() {
            return Err(EscrowError::InvalidInput(
                "Seller address must differ from the buyer".to_string(),
            ));
        }

        let call = createEscrowCall {
            buyer: wallet.address(),
            seller,
        };
        let tx_hash = self.submitter.submit_with(&wallet, &call, U256::ZERO).await?;

        let state = OperationState::new(&self.identity, Phase::AwaitingId)
            .with_tx(tx_hash)
            .with_message(format!("Escrow creation submitted in {}", tx_hash));
        self.persist(&state)?;
        Ok(StepReport::from_state(&state, Some(self.create_grace)))
    }

    /// Wait for the creation receipt and move to AWAITING_FUND.
    pub async fn resolve_created_id(&self, tx_hash: TxHash) -> EscrowResult<u64> {
        let _guard = self.step_lock.lock().await;
        let record_id = self.awaiter.await_created_id(tx_hash).await?;

        let state = OperationState::new(&self.identity, Phase::AwaitingFund)
            .with_tx(tx_hash)
            .with_record(record_id)
            .with_message(format!("Escrow {} created", record_id));
        self.persist(&state)?;
        Ok(record_id)
    }

    /// Deposit `amount_wei` into `record_id` and move to AWAITING_APPROVAL.
    pub async fn fund_escrow(
        &self,
        key: &str,
        record_id: u64,
        amount_wei: U256,
    ) -> EscrowResult<StepReport> {
        if amount_wei.is_zero() {
            return Err(EscrowError::InvalidInput(
                "Deposit amount must be greater than zero".to_string(),
            ));
        }
        let _guard = self.step_lock.lock().await;

        let call = fundCall {
            escrowId: U256::from(record_id),
        };
        let tx_hash = self.submitter.submit(key, &call, amount_wei).await?;

        let state = OperationState::new(&self.identity, Phase::AwaitingApproval)
            .with_tx(tx_hash)
            .with_record(record_id)
            .with_message(format!("Escrow {} funded with {} wei", record_id, amount_wei));
        self.persist(&state)?;
        Ok(StepReport::from_state(&state, Some(self.fund_grace)))
    }

    /// Approve release as the buyer and move to AWAITING_VERIFICATION.
    pub async fn approve_release(&self, key: &str, record_id: u64) -> EscrowResult<StepReport> {
        let _guard = self.step_lock.lock().await;

        let call = approveReleaseCall {
            escrowId: U256::from(record_id),
        };
        let tx_hash = self.submitter.submit(key, &call, U256::ZERO).await?;

        let state = OperationState::new(&self.identity, Phase::AwaitingVerification)
            .with_tx(tx_hash)
            .with_record(record_id)
            .with_message(format!("Release of escrow {} approved", record_id));
        self.persist(&state)?;
        Ok(StepReport::from_state(&state, None))
    }

    /// Check that the buyer approval landed. Clears the slot once it has.
    ///
    /// The saved operation must be awaiting verification of `record_id`;
    /// anything else is rejected and the slot is left untouched.
    pub async fn verify_completion(&self, record_id: u64) -> EscrowResult<Verification> {
        let _guard = self.step_lock.lock().await;
        let state = match self.load_owned()? {
            Some(state) => state,
            None => return Ok(Verification::AlreadyCleared),
        };
        if state.phase != Phase::AwaitingVerification {
            return Err(EscrowError::InvalidInput(format!(
                "Operation is in phase {}, not {}",
                state.phase,
                Phase::AwaitingVerification
            )));
        }
        if state.record_id != Some(record_id) {
            return Err(EscrowError::InvalidInput(format!(
                "Operation in flight is for escrow {}, not {}",
                state.record_id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
                record_id
            )));
        }

        let record = self.chain.read_escrow(record_id).await?;
        if record.has_approval() {
            self.store.clear()?;
            metrics::record_step(Phase::None.as_str());
            tracing::info!(record_id = record_id, approvals = record.approval_count, "Operation completed");
            Ok(Verification::Completed)
        } else {
            tracing::debug!(record_id = record_id, "Release not yet confirmed");
            Ok(Verification::Pending)
        }
    }

    /// Take over a record found by a dashboard scan.
    ///
    /// Only the record's buyer can adopt it, and only before release.
    pub async fn adopt_record(&self, key: &str, record_id: u64) -> EscrowResult<StepReport> {
        let _guard = self.step_lock.lock().await;
        let buyer = Wallet::from_private_key(key)?.address();
        let record = self.chain.read_escrow(record_id).await?;

        if record.buyer != buyer {
            return Err(EscrowError::InvalidInput(format!(
                "Escrow {} does not belong to buyer {}",
                record_id, buyer
            )));
        }
        let phase = match BuyerStatus::from_record(&record) {
            BuyerStatus::AwaitingFunding => Phase::AwaitingFund,
            BuyerStatus::AwaitingApproval => Phase::AwaitingApproval,
            BuyerStatus::Finalized => {
                return Err(EscrowError::InvalidInput(format!(
                    "Escrow {} is already finalized",
                    record_id
                )))
            }
            BuyerStatus::Unknown => {
                return Err(EscrowError::InvalidInput(format!(
                    "Escrow {} is in an unexpected state",
                    record_id
                )))
            }
        };

        let state = OperationState::new(&self.identity, phase)
            .with_record(record_id)
            .with_message(format!("Resumed escrow {}", record_id));
        self.persist(&state)?;
        Ok(StepReport::from_state(&state, None))
    }

    pub async fn check_buyer_status(&self, record_id: u64) -> EscrowResult<BuyerStatus> {
        let record = self.chain.read_escrow(record_id).await?;
        Ok(BuyerStatus::from_record(&record))
    }

    // ---- seller flow ----

    pub async fn check_status(&self, record_id: u64) -> EscrowResult<SellerStatus> {
        let record = self.chain.read_escrow(record_id).await?;
        Ok(SellerStatus::from_record(&record))
    }

    /// Second approval by the seller. Re-reads the record first.
    pub async fn claim(&self, key: &str, record_id: u64) -> EscrowResult<TxHash> {
        let record = self.chain.read_escrow(record_id).await?;
        if !record.funded || record.approval_count != 1 {
            return Err(EscrowError::NotClaimable {
                record_id,
                funded: record.funded,
                approvals: record.approval_count,
            });
        }

        let call = approveReleaseCall {
            escrowId: U256::from(record_id),
        };
        let tx_hash = self.submitter.submit(key, &call, U256::ZERO).await?;
        self.completed.insert(record_id)?;
        tracing::info!(record_id = record_id, tx_hash = %tx_hash, "Payment claimed");
        Ok(tx_hash)
    }

    // ---- platform ----

    /// Platform ruling on a disputed record. Success is chain-level only.
    pub async fn resolve_dispute(
        &self,
        platform_key: &str,
        record_id: u64,
        refund_buyer: bool,
    ) -> EscrowResult<TxHash> {
        let call = resolveDisputeCall {
            escrowId: U256::from(record_id),
            refundBuyer: refund_buyer,
        };
        let tx_hash = self.submitter.submit(platform_key, &call, U256::ZERO).await?;
        tracing::info!(
            record_id = record_id,
            refund_buyer = refund_buyer,
            tx_hash = %tx_hash,
            "Dispute resolved on chain"
        );
        Ok(tx_hash)
    }

    // ---- slot management ----

    /// Persisted operation for this identity, if any. Slots owned by
    /// another identity are discarded.
    pub async fn resume(&self) -> EscrowResult<Option<OperationState>> {
        let _guard = self.step_lock.lock().await;
        let state = self.load_owned()?;
        if let Some(state) = &state {
            tracing::info!(
                phase = %state.phase,
                record_id = ?state.record_id,
                tx_hash = ?state.last_tx,
                "Resuming operation"
            );
        }
        Ok(state)
    }

    pub async fn cancel(&self) -> EscrowResult<()> {
        let _guard = self.step_lock.lock().await;
        self.store.clear()?;
        tracing::info!(identity = %self.identity, "Operation cancelled");
        Ok(())
    }

    pub async fn phase(&self) -> EscrowResult<Phase> {
        let _guard = self.step_lock.lock().await;
        Ok(self.load_owned()?.map(|s| s.phase).unwrap_or(Phase::None))
    }

    /// Run `step` on a background task. Steps queue on the step lock in
    /// submission order.
    pub fn spawn_step(&self, step: Step) -> oneshot::Receiver<EscrowResult<StepOutput>> {
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            let name = step.name();
            let result = this.run_step(step).await;
            if let Err(e) = &result {
                tracing::warn!(step = name, error = %e, "Background step failed");
            }
            // Receiver may have been dropped
            let _ = tx.send(result);
        });
        rx
    }

    async fn run_step(&self, step: Step) -> EscrowResult<StepOutput> {
        match step {
            Step::Create { key, seller } => self.create_escrow(&key, seller).await.map(StepOutput::Report),
            Step::ResolveId { tx_hash } => self.resolve_created_id(tx_hash).await.map(StepOutput::RecordId),
            Step::Fund {
                key,
                record_id,
                amount_wei,
            } => self
                .fund_escrow(&key, record_id, amount_wei)
                .await
                .map(StepOutput::Report),
            Step::Approve { key, record_id } => {
                self.approve_release(&key, record_id).await.map(StepOutput::Report)
            }
            Step::Verify { record_id } => self
                .verify_completion(record_id)
                .await
                .map(StepOutput::Verification),
            Step::Claim { key, record_id } => self.claim(&key, record_id).await.map(StepOutput::Submitted),
            Step::Adopt { key, record_id } => {
                self.adopt_record(&key, record_id).await.map(StepOutput::Report)
            }
            Step::ResolveDispute {
                platform_key,
                record_id,
                refund_buyer,
            } => self
                .resolve_dispute(&platform_key, record_id, refund_buyer)
                .await
                .map(StepOutput::Submitted),
        }
    }

    fn persist(&self, state: &OperationState) -> EscrowResult<()> {
        state.save(self.store.as_ref())?;
        metrics::record_step(state.phase.as_str());
        tracing::info!(
            phase = %state.phase,
            record_id = ?state.record_id,
            tx_hash = ?state.last_tx,
            "Operation state saved"
        );
        Ok(())
    }

    fn load_owned(&self) -> EscrowResult<Option<OperationState>> {
        let Some(state) = OperationState::load(self.store.as_ref())? else {
            return Ok(None);
        };
        if state.owner != self.identity {
            let mismatch = EscrowError::StateMismatch {
                expected: self.identity.clone(),
                found: state.owner,
            };
            tracing::debug!(error = %mismatch, "Discarding persisted operation");
            self.store.clear()?;
            return Ok(None);
        }
        Ok(Some(state))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("identity", &self.identity)
            .field("submitter", &self.submitter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(funded: bool, approvals: u64, amount: u64) -> EscrowRecord {
        EscrowRecord {
            id: 3,
            buyer: Address::repeat_byte(0xaa),
            seller: Address::repeat_byte(0xbb),
            amount_wei: U256::from(amount),
            funded,
            approval_count: approvals,
        }
    }

    #[test]
    fn test_seller_status() {
        assert_eq!(SellerStatus::from_record(&record(false, 0, 0)), SellerStatus::NotFunded);
        assert_eq!(
            SellerStatus::from_record(&record(true, 0, 10)),
            SellerStatus::AwaitingBuyerApproval
        );
        assert_eq!(SellerStatus::from_record(&record(true, 1, 10)), SellerStatus::ReadyToClaim);
        assert_eq!(SellerStatus::from_record(&record(true, 2, 10)), SellerStatus::Released);
    }

    #[test]
    fn test_buyer_status() {
        assert_eq!(BuyerStatus::from_record(&record(false, 0, 0)), BuyerStatus::AwaitingFunding);
        assert_eq!(BuyerStatus::from_record(&record(true, 0, 10)), BuyerStatus::AwaitingApproval);
        assert_eq!(BuyerStatus::from_record(&record(true, 1, 10)), BuyerStatus::Finalized);
        assert_eq!(BuyerStatus::from_record(&record(false, 0, 10)), BuyerStatus::Unknown);
    }

    #[test]
    fn test_step_names() {
        let step = Step::Verify { record_id: 1 };
        assert_eq!(step.name(), "verify");
        let step = Step::ResolveId {
            tx_hash: TxHash::ZERO,
        };
        assert_eq!(step.name(), "resolve_id");
    }
}
