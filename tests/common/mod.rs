//! Shared harness for integration tests: a scripted in-process chain and an
//! in-memory dispute ledger.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{address, Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::{SolEvent, SolInterface};
use async_trait::async_trait;

use escrow_orchestrator::blockchain::contract::{EscrowCreated, IEscrowCalls};
use escrow_orchestrator::blockchain::{
    ChainClient, EscrowRecord, EventAwaiter, Receipt, ReceiptLog, TxSubmitter,
};
use escrow_orchestrator::config::ScannerConfig;
use escrow_orchestrator::disputes::{Decision, DisputeEntry, DisputeLedger, DisputeStatus, NewDispute};
use escrow_orchestrator::error::{EscrowError, EscrowResult};
use escrow_orchestrator::operations::Orchestrator;
use escrow_orchestrator::resilience::Backoff;
use escrow_orchestrator::storage::{CompletedIds, MemoryStore};

pub const CHAIN_ID: u64 = 31337;
pub const CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

// Well-known local development accounts 0, 1 and 2.
pub const BUYER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const BUYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const SELLER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const SELLER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const PLATFORM_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub const PLATFORM: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

#[derive(Default)]
struct ChainState {
    records: BTreeMap<u64, EscrowRecord>,
    next_id: u64,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, Receipt>,
    read_failures: HashMap<u64, u32>,
    broken_ids: HashSet<u64>,
    withhold_receipts: bool,
    suppress_events: bool,
    broadcast_error: Option<EscrowError>,
    reads: Vec<u64>,
    receipt_polls: u32,
    submitted: Vec<(Address, &'static str)>,
    resolutions: Vec<(u64, bool)>,
}

/// Escrow contract simulated in memory. Accepts real signed transactions,
/// recovers the sender and applies the decoded call.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<T>(&self, f: impl FnOnce(&mut ChainState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn insert(&self, record: EscrowRecord) {
        self.with(|s| {
            s.next_id = s.next_id.max(record.id + 1);
            s.records.insert(record.id, record);
        });
    }

    pub fn update(&self, id: u64, f: impl FnOnce(&mut EscrowRecord)) {
        self.with(|s| f(s.records.get_mut(&id).expect("record exists")));
    }

    pub fn record(&self, id: u64) -> Option<EscrowRecord> {
        self.with(|s| s.records.get(&id).cloned())
    }

    /// Next `times` reads of `id` fail with a network error.
    pub fn fail_reads(&self, id: u64, times: u32) {
        self.with(|s| {
            s.read_failures.insert(id, times);
        });
    }

    /// Every read of `id` fails with a network error.
    pub fn break_id(&self, id: u64) {
        self.with(|s| {
            s.broken_ids.insert(id);
        });
    }

    pub fn withhold_receipts(&self, withhold: bool) {
        self.with(|s| s.withhold_receipts = withhold);
    }

    pub fn suppress_events(&self, suppress: bool) {
        self.with(|s| s.suppress_events = suppress);
    }

    pub fn fail_broadcast(&self, error: Option<EscrowError>) {
        self.with(|s| s.broadcast_error = error);
    }

    pub fn reads(&self) -> Vec<u64> {
        self.with(|s| s.reads.clone())
    }

    pub fn receipt_polls(&self) -> u32 {
        self.with(|s| s.receipt_polls)
    }

    pub fn clear_reads(&self) {
        self.with(|s| s.reads.clear());
    }

    pub fn submitted(&self) -> Vec<(Address, &'static str)> {
        self.with(|s| s.submitted.clone())
    }

    pub fn resolutions(&self) -> Vec<(u64, bool)> {
        self.with(|s| s.resolutions.clone())
    }

    fn apply(
        state: &mut ChainState,
        sender: Address,
        value: U256,
        call: IEscrowCalls,
    ) -> EscrowResult<(&'static str, Vec<ReceiptLog>)> {
        match call {
            IEscrowCalls::createEscrow(c) => {
                let id = state.next_id;
                state.next_id += 1;
                state.records.insert(
                    id,
                    EscrowRecord {
                        id,
                        buyer: c.buyer,
                        seller: c.seller,
                        amount_wei: U256::ZERO,
                        funded: false,
                        approval_count: 0,
                    },
                );

                let mut logs = Vec::new();
                if !state.suppress_events {
                    let event = EscrowCreated {
                        escrowId: U256::from(id),
                        buyer: c.buyer,
                        seller: c.seller,
                    };
                    logs.push(ReceiptLog {
                        address: CONTRACT,
                        topics: vec![
                            EscrowCreated::SIGNATURE_HASH,
                            B256::from(U256::from(id).to_be_bytes::<32>()),
                        ],
                        data: Bytes::from(event.encode_data()),
                    });
                }
                Ok(("createEscrow", logs))
            }
            IEscrowCalls::fund(c) => {
                let id = c.escrowId.to::<u64>();
                let Some(record) = state.records.get_mut(&id) else {
                    return revert("unknown escrow");
                };
                if record.buyer != sender {
                    return revert("only buyer");
                }
                if record.funded {
                    return revert("already funded");
                }
                if value.is_zero() {
                    return revert("no value");
                }
                record.funded = true;
                record.amount_wei = value;
                Ok(("fund", Vec::new()))
            }
            IEscrowCalls::approveRelease(c) => {
                let id = c.escrowId.to::<u64>();
                let Some(record) = state.records.get_mut(&id) else {
                    return revert("unknown escrow");
                };
                if !record.involves(sender) {
                    return revert("not a participant");
                }
                if !record.funded {
                    return revert("not funded");
                }
                record.approval_count += 1;
                Ok(("approveRelease", Vec::new()))
            }
            IEscrowCalls::resolveDispute(c) => {
                let id = c.escrowId.to::<u64>();
                if sender != PLATFORM {
                    return revert("only platform");
                }
                let Some(record) = state.records.get_mut(&id) else {
                    return revert("unknown escrow");
                };
                record.approval_count = 2;
                state.resolutions.push((id, c.refundBuyer));
                Ok(("resolveDispute", Vec::new()))
            }
            IEscrowCalls::getEscrow(_) => revert("view function"),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn read_escrow(&self, id: u64) -> EscrowResult<EscrowRecord> {
        self.with(|s| {
            s.reads.push(id);
            if s.broken_ids.contains(&id) {
                return Err(EscrowError::Network("connection reset".into()));
            }
            if let Some(remaining) = s.read_failures.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EscrowError::Network("connection reset".into()));
                }
            }
            s.records.get(&id).cloned().ok_or(EscrowError::NotFound(id))
        })
    }

    async fn nonce(&self, address: Address) -> EscrowResult<u64> {
        Ok(self.with(|s| s.nonces.get(&address).copied().unwrap_or(0)))
    }

    async fn gas_price(&self) -> EscrowResult<u128> {
        Ok(1_000_000_000)
    }

    async fn broadcast(&self, raw: Bytes) -> EscrowResult<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| EscrowError::Contract(format!("invalid transaction: {}", e)))?;
        let sender = envelope
            .recover_signer()
            .map_err(|e| EscrowError::Contract(format!("invalid signature: {}", e)))?;
        let tx_hash = *envelope.tx_hash();

        self.with(|s| {
            if let Some(err) = s.broadcast_error.clone() {
                return Err(err);
            }
            if envelope.chain_id() != Some(CHAIN_ID) {
                return Err(EscrowError::Contract("wrong chain id".into()));
            }
            if envelope.to() != Some(CONTRACT) {
                return Err(EscrowError::Contract("unexpected recipient".into()));
            }
            let expected_nonce = s.nonces.get(&sender).copied().unwrap_or(0);
            if envelope.nonce() != expected_nonce {
                return Err(EscrowError::Contract("nonce too low".into()));
            }

            let call = IEscrowCalls::abi_decode(envelope.input())
                .map_err(|e| EscrowError::Contract(format!("bad calldata: {}", e)))?;
            let (name, logs) = Self::apply(s, sender, envelope.value(), call)?;

            s.nonces.insert(sender, expected_nonce + 1);
            s.submitted.push((sender, name));
            s.receipts.insert(
                tx_hash,
                Receipt {
                    tx_hash,
                    success: true,
                    block_number: Some(s.submitted.len() as u64),
                    logs,
                },
            );
            Ok(tx_hash)
        })
    }

    async fn receipt(&self, tx_hash: TxHash) -> EscrowResult<Option<Receipt>> {
        Ok(self.with(|s| {
            s.receipt_polls += 1;
            if s.withhold_receipts {
                None
            } else {
                s.receipts.get(&tx_hash).cloned()
            }
        }))
    }
}

fn revert<T>(msg: &str) -> EscrowResult<T> {
    Err(EscrowError::Contract(format!("execution reverted: {}", msg)))
}

pub fn record(id: u64, buyer: Address, seller: Address, funded: bool, approvals: u64) -> EscrowRecord {
    EscrowRecord {
        id,
        buyer,
        seller,
        amount_wei: if funded { U256::from(10u64).pow(U256::from(17u64)) } else { U256::ZERO },
        funded,
        approval_count: approvals,
    }
}

/// Orchestrator over `chain` with short receipt waits.
pub fn orchestrator(
    chain: &Arc<MockChain>,
    store: Arc<MemoryStore>,
    completed: CompletedIds,
    identity: &str,
) -> Orchestrator {
    let chain: Arc<dyn ChainClient> = chain.clone();
    let submitter = TxSubmitter::new(chain.clone(), CONTRACT, CHAIN_ID, 300_000);
    let awaiter = EventAwaiter::new(
        chain.clone(),
        Duration::from_millis(300),
        Backoff::Exponential { base_ms: 5, max_ms: 40 },
    );
    Orchestrator::new(identity, chain, submitter, awaiter, store, completed)
        .with_grace(Duration::ZERO, Duration::ZERO)
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub completed: CompletedIds,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(identity: &str) -> Self {
        let chain = MockChain::new();
        let store = Arc::new(MemoryStore::new());
        let completed = CompletedIds::new(Arc::new(MemoryStore::new()));
        let orchestrator = orchestrator(&chain, store.clone(), completed.clone(), identity);
        Self {
            chain,
            store,
            completed,
            orchestrator,
        }
    }

    /// Same chain and stores, different identity, as after a restart.
    pub fn restart_as(&self, identity: &str) -> Orchestrator {
        orchestrator(&self.chain, self.store.clone(), self.completed.clone(), identity)
    }
}

/// Scanner settings with no pacing and millisecond retries.
pub fn fast_scanner_config() -> ScannerConfig {
    ScannerConfig {
        retry_backoff_ms: 1,
        probe_interval_ms: 0,
        ..Default::default()
    }
}

/// Ledger kept in memory.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<DisputeEntry>>,
    fail_updates: Mutex<bool>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<DisputeEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn fail_updates(&self, fail: bool) {
        *self.fail_updates.lock().unwrap() = fail;
    }

    fn append_status(
        &self,
        record_id: u64,
        status: DisputeStatus,
        decision: Option<Decision>,
    ) -> EscrowResult<()> {
        if *self.fail_updates.lock().unwrap() {
            return Err(EscrowError::Ledger("ledger offline".into()));
        }
        let mut entries = self.entries.lock().unwrap();
        let first = entries
            .iter()
            .find(|e| e.record_id == record_id)
            .cloned()
            .ok_or_else(|| EscrowError::Ledger(format!("no dispute for escrow {}", record_id)))?;
        let id = entries.len() as u64 + 1;
        entries.push(DisputeEntry {
            id,
            status,
            decision,
            ..first
        });
        Ok(())
    }
}

#[async_trait]
impl DisputeLedger for MemoryLedger {
    async fn open(&self, dispute: &NewDispute) -> EscrowResult<DisputeEntry> {
        let mut entries = self.entries.lock().unwrap();
        let entry = DisputeEntry {
            id: entries.len() as u64 + 1,
            record_id: dispute.record_id,
            owner: dispute.owner.clone(),
            role: dispute.role,
            reason: dispute.reason.clone(),
            buyer: dispute.buyer,
            seller: dispute.seller,
            status: DisputeStatus::Open,
            decision: None,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, identity: &str) -> EscrowResult<Vec<DisputeEntry>> {
        let entries = self.entries.lock().unwrap();
        let records: HashSet<u64> = entries
            .iter()
            .filter(|e| e.owner == identity)
            .map(|e| e.record_id)
            .collect();
        Ok(entries
            .iter()
            .filter(|e| records.contains(&e.record_id))
            .cloned()
            .collect())
    }

    async fn request_review(&self, record_id: u64) -> EscrowResult<()> {
        self.append_status(record_id, DisputeStatus::UnderReview, None)
    }

    async fn mark_resolved(&self, record_id: u64, decision: Decision) -> EscrowResult<()> {
        self.append_status(record_id, DisputeStatus::Resolved, Some(decision))
    }
}
