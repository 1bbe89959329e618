//! Dispute ledger records.

use std::collections::BTreeMap;
use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::blockchain::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisputeStatus::Open => f.write_str("open"),
            DisputeStatus::UnderReview => f.write_str("under review"),
            DisputeStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// Platform ruling: which side receives the deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Buyer,
    Seller,
}

impl Decision {
    /// `resolveDispute` flag for this ruling.
    pub fn refund_buyer(&self) -> bool {
        matches!(self, Decision::Buyer)
    }
}

/// Request to open a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDispute {
    pub owner: String,
    pub record_id: u64,
    pub role: Role,
    pub reason: String,
    pub buyer: Address,
    pub seller: Address,
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeEntry {
    pub id: u64,
    pub record_id: u64,
    pub owner: String,
    pub role: Role,
    pub reason: String,
    pub buyer: Address,
    pub seller: Address,
    pub status: DisputeStatus,
    #[serde(default)]
    pub decision: Option<Decision>,
}

/// Every ledger row for one escrow record, folded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisputeSummary {
    pub record_id: u64,
    /// Role of whoever filed first.
    pub creator_role: Role,
    pub status: DisputeStatus,
    pub decision: Option<Decision>,
    pub entries: usize,
}

/// Group rows by record id. Rows are ordered by ledger id, so the first
/// row names the creator and the last carries the current status.
pub fn group_by_record(mut entries: Vec<DisputeEntry>) -> Vec<DisputeSummary> {
    entries.sort_by_key(|e| e.id);

    let mut grouped: BTreeMap<u64, DisputeSummary> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.record_id)
            .and_modify(|summary| {
                summary.status = entry.status;
                if entry.decision.is_some() {
                    summary.decision = entry.decision;
                }
                summary.entries += 1;
            })
            .or_insert_with(|| DisputeSummary {
                record_id: entry.record_id,
                creator_role: entry.role,
                status: entry.status,
                decision: entry.decision,
                entries: 1,
            });
    }
    grouped.into_values().collect()
}
