//! Waiting for creation receipts and extracting the new escrow id.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use alloy::sol_types::SolEvent;

use crate::blockchain::client::ChainClient;
use crate::blockchain::contract::EscrowCreated;
use crate::blockchain::types::Receipt;
use crate::config::OrchestratorConfig;
use crate::error::{EscrowError, EscrowResult};
use crate::resilience::Backoff;

/// Default wait ceiling for a creation receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolves a `createEscrow` transaction to the id it allocated.
#[derive(Clone)]
pub struct EventAwaiter {
    chain: Arc<dyn ChainClient>,
    timeout: Duration,
    poll: Backoff,
}

impl EventAwaiter {
    pub fn new(chain: Arc<dyn ChainClient>, timeout: Duration, poll: Backoff) -> Self {
        Self {
            chain,
            timeout,
            poll,
        }
    }

    pub fn from_config(chain: Arc<dyn ChainClient>, config: &OrchestratorConfig) -> Self {
        Self::new(
            chain,
            Duration::from_secs(config.receipt_timeout_secs),
            Backoff::Exponential {
                base_ms: config.receipt_poll_ms,
                max_ms: config.receipt_poll_max_ms,
            },
        )
    }

    /// Wait for `tx_hash` to be mined and decode the `EscrowCreated` id.
    pub async fn await_created_id(&self, tx_hash: TxHash) -> EscrowResult<u64> {
        let receipt = self
            .chain
            .await_receipt(tx_hash, self.timeout, self.poll)
            .await?;

        if !receipt.success {
            return Err(EscrowError::Contract(format!(
                "Transaction {} reverted",
                tx_hash
            )));
        }

        let id = created_id_from_receipt(&receipt)?;
        tracing::info!(tx_hash = %tx_hash, escrow_id = id, "Escrow id resolved");
        Ok(id)
    }
}

/// First log whose topic0 is the `EscrowCreated` hash; the id is topic1.
pub fn created_id_from_receipt(receipt: &Receipt) -> EscrowResult<u64> {
    let log = receipt
        .logs
        .iter()
        .find(|log| log.topics.first() == Some(&EscrowCreated::SIGNATURE_HASH))
        .ok_or_else(|| EscrowError::EventNotFound(receipt.tx_hash.to_string()))?;

    let topic = log
        .topics
        .get(1)
        .ok_or_else(|| EscrowError::EventNotFound(receipt.tx_hash.to_string()))?;

    let id = U256::from_be_bytes(topic.0);
    u64::try_from(id)
        .map_err(|_| EscrowError::Contract(format!("Escrow id {} does not fit in u64", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ReceiptLog;
    use alloy::primitives::{Address, Bytes, B256};

    fn receipt_with(logs: Vec<ReceiptLog>) -> Receipt {
        Receipt {
            tx_hash: B256::repeat_byte(0x42),
            success: true,
            block_number: Some(10),
            logs,
        }
    }

    fn log(topics: Vec<B256>) -> ReceiptLog {
        ReceiptLog {
            address: Address::ZERO,
            topics,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_decodes_indexed_id() {
        let id_topic = B256::from(U256::from(17u64).to_be_bytes::<32>());
        let receipt = receipt_with(vec![
            log(vec![B256::repeat_byte(0x01)]),
            log(vec![EscrowCreated::SIGNATURE_HASH, id_topic]),
        ]);
        assert_eq!(created_id_from_receipt(&receipt).unwrap(), 17);
    }

    #[test]
    fn test_skips_logs_without_topics() {
        let id_topic = B256::from(U256::from(3u64).to_be_bytes::<32>());
        let receipt = receipt_with(vec![log(vec![]), log(vec![EscrowCreated::SIGNATURE_HASH, id_topic])]);
        assert_eq!(created_id_from_receipt(&receipt).unwrap(), 3);
    }

    #[test]
    fn test_missing_event() {
        let receipt = receipt_with(vec![log(vec![B256::repeat_byte(0x01)])]);
        let err = created_id_from_receipt(&receipt).unwrap_err();
        assert!(matches!(err, EscrowError::EventNotFound(_)));
        assert!(!err.is_retryable());
    }
}
