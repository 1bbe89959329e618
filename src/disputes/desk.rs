//! Dispute workflow on top of the chain and the ledger.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};

use crate::blockchain::{ChainClient, Role};
use crate::disputes::ledger::DisputeLedger;
use crate::disputes::types::{group_by_record, Decision, DisputeEntry, DisputeSummary, NewDispute};
use crate::error::{EscrowError, EscrowResult};
use crate::operations::Orchestrator;

pub struct DisputeDesk {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DisputeLedger>,
    orchestrator: Orchestrator,
}

impl DisputeDesk {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn DisputeLedger>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            chain,
            ledger,
            orchestrator,
        }
    }

    /// File a dispute after checking on chain that `caller` is the
    /// record's `role` and that there is a deposit left to fight over.
    pub async fn open(
        &self,
        owner: &str,
        caller: Address,
        record_id: u64,
        role: Role,
        reason: &str,
    ) -> EscrowResult<DisputeEntry> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::InvalidInput("Dispute reason is required".to_string()));
        }

        let record = self.chain.read_escrow(record_id).await?;
        let expected = match role {
            Role::Buyer => record.buyer,
            Role::Seller => record.seller,
        };
        if expected != caller {
            return Err(EscrowError::InvalidInput(format!(
                "{} is not the {} of escrow {}",
                caller, role, record_id
            )));
        }
        if !record.funded {
            return Err(EscrowError::InvalidInput(format!(
                "Escrow {} has no deposit to dispute",
                record_id
            )));
        }
        if record.is_released() {
            return Err(EscrowError::InvalidInput(format!(
                "Escrow {} is already released",
                record_id
            )));
        }

        let dispute = NewDispute {
            owner: owner.to_string(),
            record_id,
            role,
            reason: reason.to_string(),
            buyer: record.buyer,
            seller: record.seller,
        };
        self.ledger.open(&dispute).await
    }

    pub async fn list(&self, identity: &str) -> EscrowResult<Vec<DisputeSummary>> {
        let entries = self.ledger.list(identity).await?;
        Ok(group_by_record(entries))
    }

    pub async fn request_review(&self, record_id: u64) -> EscrowResult<()> {
        self.ledger.request_review(record_id).await?;
        tracing::info!(record_id = record_id, "Platform review requested");
        Ok(())
    }

    /// Rule on chain, then record the ruling in the ledger. A ledger
    /// failure is logged and does not fail the call.
    pub async fn resolve(
        &self,
        platform_key: &str,
        record_id: u64,
        decision: Decision,
    ) -> EscrowResult<TxHash> {
        let tx_hash = self
            .orchestrator
            .resolve_dispute(platform_key, record_id, decision.refund_buyer())
            .await?;

        if let Err(e) = self.ledger.mark_resolved(record_id, decision).await {
            tracing::warn!(
                record_id = record_id,
                tx_hash = %tx_hash,
                error = %e,
                "Dispute resolved on chain but ledger update failed"
            );
        }
        Ok(tx_hash)
    }
}
