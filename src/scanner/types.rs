//! Scan modes, record classification and the events a scan emits.

use alloy::primitives::Address;
use serde::Serialize;

use crate::blockchain::{EscrowRecord, Role};

/// Which screen a scan serves. Decides the failure threshold and how
/// single-approval records are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanMode {
    /// Pending work for the identity.
    Dashboard,
    /// History of settled movements.
    Movements,
}

/// Lifecycle position derived from `(funded, amount, approvals)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EscrowStatus {
    Created,
    Funded,
    FirstApproved,
    Finalized,
    Unknown,
}

impl EscrowStatus {
    /// One approval means "buyer confirmed, seller can claim" on the
    /// dashboard, and "money moved" everywhere else.
    pub fn classify(record: &EscrowRecord, mode: ScanMode) -> Self {
        if record.is_released() {
            return EscrowStatus::Finalized;
        }
        if record.approval_count == 1 {
            return match mode {
                ScanMode::Dashboard if record.funded => EscrowStatus::FirstApproved,
                _ => EscrowStatus::Finalized,
            };
        }
        if record.funded {
            EscrowStatus::Funded
        } else if record.amount_wei.is_zero() {
            EscrowStatus::Created
        } else {
            EscrowStatus::Unknown
        }
    }
}

/// Next thing the queried party has to do on a dashboard record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PendingAction {
    FundDeposit,
    ConfirmReceipt,
    ClaimPayment,
}

/// How the queried address relates to a matched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchKind {
    Participant(Role),
    /// Platform movement view; matched for being finalized.
    Platform,
}

/// A record relevant to the queried address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub id: u64,
    pub record: EscrowRecord,
    pub queried_address: Address,
    pub mode: ScanMode,
    pub status: EscrowStatus,
    pub kind: MatchKind,
}

impl ScanResult {
    /// Dashboard action for this record, if any.
    pub fn pending_action(&self) -> Option<PendingAction> {
        if self.mode != ScanMode::Dashboard {
            return None;
        }
        match (self.kind, self.status) {
            (MatchKind::Participant(Role::Buyer), EscrowStatus::Created) => Some(PendingAction::FundDeposit),
            (MatchKind::Participant(Role::Buyer), EscrowStatus::Funded) => Some(PendingAction::ConfirmReceipt),
            (MatchKind::Participant(Role::Seller), EscrowStatus::FirstApproved) => {
                Some(PendingAction::ClaimPayment)
            }
            _ => None,
        }
    }
}

/// Item on a scan channel. `Done` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Emitted every `progress_every` probes with the id just probed.
    Progress { id: u64 },
    Found(ScanResult),
    Done,
}

/// Totals returned by the scan task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub probed: u64,
    pub matched: u64,
    /// Id at which the walk stopped.
    pub last_id: u64,
}
