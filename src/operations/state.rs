//! Persisted operation slot.
//!
//! One slot per installation. Every field lives under its own `op.*` key so
//! the slot can sit in any [`KeyValueStore`].

use std::fmt;
use std::str::FromStr;

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};

use crate::error::{EscrowError, EscrowResult};
use crate::storage::KeyValueStore;

pub const KEY_PHASE: &str = "op.phase";
pub const KEY_TX: &str = "op.tx";
pub const KEY_RECORD: &str = "op.record";
pub const KEY_LOG: &str = "op.log";
pub const KEY_OWNER: &str = "op.owner";

/// Buyer flow position. Each variant names what the next step waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    None,
    AwaitingId,
    AwaitingFund,
    AwaitingApproval,
    AwaitingVerification,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::None => "NONE",
            Phase::AwaitingId => "AWAITING_ID",
            Phase::AwaitingFund => "AWAITING_FUND",
            Phase::AwaitingApproval => "AWAITING_APPROVAL",
            Phase::AwaitingVerification => "AWAITING_VERIFICATION",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Phase::None),
            "AWAITING_ID" => Ok(Phase::AwaitingId),
            "AWAITING_FUND" => Ok(Phase::AwaitingFund),
            "AWAITING_APPROVAL" => Ok(Phase::AwaitingApproval),
            "AWAITING_VERIFICATION" => Ok(Phase::AwaitingVerification),
            other => Err(EscrowError::Persistence(format!("Unknown phase '{}'", other))),
        }
    }
}

/// Snapshot of an in-flight buyer operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    pub owner: String,
    pub phase: Phase,
    pub last_tx: Option<TxHash>,
    pub record_id: Option<u64>,
    pub status_message: String,
}

impl OperationState {
    pub fn new(owner: impl Into<String>, phase: Phase) -> Self {
        Self {
            owner: owner.into(),
            phase,
            last_tx: None,
            record_id: None,
            status_message: String::new(),
        }
    }

    pub fn with_tx(mut self, tx_hash: TxHash) -> Self {
        self.last_tx = Some(tx_hash);
        self
    }

    pub fn with_record(mut self, record_id: u64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    /// Write every key, phase last. If a write fails, keys already written
    /// are put back to their previous values so the slot still reads as the
    /// previous state.
    pub fn save(&self, store: &dyn KeyValueStore) -> EscrowResult<()> {
        let tx = self.last_tx.map(|tx| tx.to_string()).unwrap_or_default();
        let record = self.record_id.map(|id| id.to_string()).unwrap_or_default();
        let writes = [
            (KEY_OWNER, self.owner.as_str()),
            (KEY_TX, tx.as_str()),
            (KEY_RECORD, record.as_str()),
            (KEY_LOG, self.status_message.as_str()),
            (KEY_PHASE, self.phase.as_str()),
        ];
        let previous = writes
            .iter()
            .map(|(key, _)| store.get(key))
            .collect::<EscrowResult<Vec<_>>>()?;

        for (written, (key, value)) in writes.iter().enumerate() {
            if let Err(e) = store.put(key, value) {
                for ((key, _), old) in writes[..written].iter().zip(&previous) {
                    if let Err(restore) = store.put(key, old.as_deref().unwrap_or_default()) {
                        tracing::warn!(key = *key, error = %restore, "Failed to restore operation key");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Read the slot. A missing or `NONE` phase is an empty slot.
    pub fn load(store: &dyn KeyValueStore) -> EscrowResult<Option<Self>> {
        let phase = match store.get(KEY_PHASE)? {
            Some(raw) if !raw.is_empty() => raw.parse::<Phase>()?,
            _ => return Ok(None),
        };
        if phase == Phase::None {
            return Ok(None);
        }

        let last_tx = match non_empty(store.get(KEY_TX)?) {
            Some(raw) => Some(raw.parse::<TxHash>().map_err(|e| {
                EscrowError::Persistence(format!("Corrupt {} value '{}': {}", KEY_TX, raw, e))
            })?),
            None => None,
        };
        let record_id = match non_empty(store.get(KEY_RECORD)?) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                EscrowError::Persistence(format!("Corrupt {} value '{}': {}", KEY_RECORD, raw, e))
            })?),
            None => None,
        };

        Ok(Some(Self {
            owner: store.get(KEY_OWNER)?.unwrap_or_default(),
            phase,
            last_tx,
            record_id,
            status_message: store.get(KEY_LOG)?.unwrap_or_default(),
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_phase_names_round_trip() {
        for phase in [
            Phase::None,
            Phase::AwaitingId,
            Phase::AwaitingFund,
            Phase::AwaitingApproval,
            Phase::AwaitingVerification,
        ] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("FUNDING".parse::<Phase>().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let state = OperationState::new("alice", Phase::AwaitingFund)
            .with_tx(TxHash::repeat_byte(0x11))
            .with_record(7)
            .with_message("Escrow 7 created");
        state.save(&store).unwrap();

        assert_eq!(store.get(KEY_PHASE).unwrap().as_deref(), Some("AWAITING_FUND"));
        assert_eq!(store.get(KEY_RECORD).unwrap().as_deref(), Some("7"));
        assert_eq!(OperationState::load(&store).unwrap(), Some(state));
    }

    #[test]
    fn test_absent_fields_load_as_none() {
        let store = MemoryStore::new();
        OperationState::new("bob", Phase::AwaitingId).save(&store).unwrap();
        let loaded = OperationState::load(&store).unwrap().unwrap();
        assert_eq!(loaded.last_tx, None);
        assert_eq!(loaded.record_id, None);
    }

    #[test]
    fn test_empty_store_has_no_state() {
        let store = MemoryStore::new();
        assert_eq!(OperationState::load(&store).unwrap(), None);
        store.put(KEY_PHASE, "NONE").unwrap();
        assert_eq!(OperationState::load(&store).unwrap(), None);
    }

    /// Memory store that rejects writes to one key.
    struct FailingStore {
        inner: MemoryStore,
        fail_key: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn put(&self, key: &str, value: &str) -> EscrowResult<()> {
            if key == self.fail_key {
                return Err(EscrowError::Persistence("disk full".to_string()));
            }
            self.inner.put(key, value)
        }

        fn get(&self, key: &str) -> EscrowResult<Option<String>> {
            self.inner.get(key)
        }

        fn clear(&self) -> EscrowResult<()> {
            self.inner.clear()
        }
    }

    #[test]
    fn test_failed_save_restores_previous_state() {
        let inner = MemoryStore::new();
        let before = OperationState::new("alice", Phase::AwaitingFund)
            .with_tx(TxHash::repeat_byte(0x11))
            .with_record(7)
            .with_message("Escrow 7 created");
        before.save(&inner).unwrap();

        let store = FailingStore {
            inner: inner.clone(),
            fail_key: KEY_PHASE,
        };
        let after = OperationState::new("alice", Phase::AwaitingApproval)
            .with_tx(TxHash::repeat_byte(0x22))
            .with_record(7)
            .with_message("Escrow 7 funded");
        assert!(after.save(&store).is_err());

        assert_eq!(OperationState::load(&inner).unwrap(), Some(before));
    }

    #[test]
    fn test_failed_first_save_leaves_slot_empty() {
        let store = FailingStore {
            inner: MemoryStore::new(),
            fail_key: KEY_LOG,
        };
        let state = OperationState::new("bob", Phase::AwaitingId).with_tx(TxHash::repeat_byte(0x33));
        assert!(state.save(&store).is_err());
        assert_eq!(OperationState::load(&store).unwrap(), None);
        assert_eq!(store.get(KEY_TX).unwrap().as_deref(), Some(""));
    }
}
