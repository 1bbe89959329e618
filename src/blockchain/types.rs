//! Chain-facing data types.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};

/// Approvals at which the contract considers an escrow released.
pub const COMPLETION_THRESHOLD: u64 = 2;

/// On-chain escrow record as returned by `getEscrow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: u64,
    pub buyer: Address,
    pub seller: Address,
    pub amount_wei: U256,
    pub funded: bool,
    pub approval_count: u64,
}

impl EscrowRecord {
    /// Buyer or seller equals `address`. Address equality is byte equality,
    /// so checksum casing never matters.
    pub fn involves(&self, address: Address) -> bool {
        self.buyer == address || self.seller == address
    }

    /// At least one party approved release.
    pub fn has_approval(&self) -> bool {
        self.approval_count > 0
    }

    /// Both approvals are in, or the platform resolved it.
    pub fn is_released(&self) -> bool {
        self.approval_count >= COMPLETION_THRESHOLD
    }

    /// Side `address` is on. Buyer wins if it is both.
    pub fn role_of(&self, address: Address) -> Option<Role> {
        if self.buyer == address {
            Some(Role::Buyer)
        } else if self.seller == address {
            Some(Role::Seller)
        } else {
            None
        }
    }
}

/// Side of an escrow a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Buyer => f.write_str("buyer"),
            Role::Seller => f.write_str("seller"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            other => Err(crate::error::EscrowError::InvalidInput(format!(
                "Unknown role '{}'",
                other
            ))),
        }
    }
}

/// A log entry from a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Mined transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// False when the transaction reverted.
    pub success: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<ReceiptLog>,
}
