//! Sequential probe over escrow ids.
//!
//! The contract keeps no per-party index, so discovery walks ids from zero
//! until enough consecutive probes come back empty or failed. A gap longer
//! than the threshold hides everything after it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use alloy::primitives::Address;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::blockchain::{ChainClient, EscrowRecord};
use crate::config::ScannerConfig;
use crate::error::EscrowError;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::scanner::types::{EscrowStatus, MatchKind, ScanEvent, ScanMode, ScanResult, ScanSummary};
use crate::storage::CompletedIds;

/// Launches scans. Cheap to clone; every scan gets its own task.
#[derive(Clone)]
pub struct RecordScanner {
    chain: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    dashboard_threshold: u32,
    movement_threshold: u32,
    probe_interval: Duration,
    progress_every: u64,
    platform_address: Option<Address>,
    completed: Option<CompletedIds>,
}

impl RecordScanner {
    pub fn new(chain: Arc<dyn ChainClient>, config: &ScannerConfig) -> Self {
        let platform_address = config
            .platform_address
            .as_deref()
            .and_then(|raw| raw.parse::<Address>().ok());

        Self {
            chain,
            retry: RetryPolicy::from_scanner_config(config),
            dashboard_threshold: config.dashboard_failure_threshold,
            movement_threshold: config.movement_failure_threshold,
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            progress_every: config.progress_every,
            platform_address,
            completed: None,
        }
    }

    /// Hide ids the identity already claimed from dashboard scans.
    pub fn with_completed(mut self, completed: CompletedIds) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn threshold(&self, mode: ScanMode) -> u32 {
        match mode {
            ScanMode::Dashboard => self.dashboard_threshold,
            ScanMode::Movements => self.movement_threshold,
        }
    }

    /// Start a scan on a background task.
    ///
    /// The walk runs to its termination condition even if the handle is
    /// dropped.
    pub fn scan(&self, identity: &str, address: Address, mode: ScanMode) -> ScanHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = self.clone();
        let identity = identity.to_string();
        let task = tokio::spawn(async move { this.walk(identity, address, mode, tx).await });
        ScanHandle { events: rx, task }
    }

    async fn walk(
        self,
        identity: String,
        address: Address,
        mode: ScanMode,
        tx: mpsc::UnboundedSender<ScanEvent>,
    ) -> ScanSummary {
        let threshold = self.threshold(mode).max(1);
        let platform_view = mode == ScanMode::Movements && self.platform_address == Some(address);
        let suppressed = match (&self.completed, mode) {
            (Some(completed), ScanMode::Dashboard) => completed.load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Completed id set unreadable, nothing suppressed");
                Default::default()
            }),
            _ => Default::default(),
        };

        tracing::info!(
            identity = %identity,
            address = %address,
            mode = ?mode,
            platform_view = platform_view,
            "Scan started"
        );

        let mut summary = ScanSummary::default();
        let mut failures = 0u32;
        let mut id = 0u64;

        while failures < threshold {
            summary.probed += 1;
            summary.last_id = id;

            let chain = &self.chain;
            match self.retry.run(|| chain.read_escrow(id)).await {
                Ok(record) => {
                    failures = 0;
                    metrics::record_probe("hit");
                    if !suppressed.contains(&id) {
                        if let Some(result) = evaluate(record, address, mode, platform_view) {
                            summary.matched += 1;
                            metrics::record_scan_match();
                            let _ = tx.send(ScanEvent::Found(result));
                        }
                    }
                }
                Err(EscrowError::NotFound(_)) => {
                    failures += 1;
                    metrics::record_probe("miss");
                }
                Err(e) => {
                    failures += 1;
                    metrics::record_probe("error");
                    tracing::debug!(record_id = id, error = %e, "Probe failed");
                }
            }

            if self.progress_every > 0 && summary.probed % self.progress_every == 0 {
                let _ = tx.send(ScanEvent::Progress { id });
            }

            id += 1;
            if failures < threshold && !self.probe_interval.is_zero() {
                tokio::time::sleep(self.probe_interval).await;
            }
        }

        let _ = tx.send(ScanEvent::Done);
        tracing::info!(
            identity = %identity,
            probed = summary.probed,
            matched = summary.matched,
            last_id = summary.last_id,
            "Scan finished"
        );
        summary
    }
}

fn evaluate(
    record: EscrowRecord,
    address: Address,
    mode: ScanMode,
    platform_view: bool,
) -> Option<ScanResult> {
    let status = EscrowStatus::classify(&record, mode);
    let kind = match record.role_of(address) {
        Some(role) => MatchKind::Participant(role),
        None if platform_view && status == EscrowStatus::Finalized => MatchKind::Platform,
        None => return None,
    };

    Some(ScanResult {
        id: record.id,
        record,
        queried_address: address,
        mode,
        status,
        kind,
    })
}

/// Receiving side of a running scan.
pub struct ScanHandle {
    pub events: mpsc::UnboundedReceiver<ScanEvent>,
    pub task: JoinHandle<ScanSummary>,
}

impl ScanHandle {
    /// Matches only, ending at `Done`. The task is detached.
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = ScanResult> + Send>> {
        let mut events = self.events;
        let mut finished = false;
        Box::pin(futures_util::stream::poll_fn(move |cx| loop {
            if finished {
                return Poll::Ready(None);
            }
            match events.poll_recv(cx) {
                Poll::Ready(Some(ScanEvent::Found(result))) => return Poll::Ready(Some(result)),
                Poll::Ready(Some(ScanEvent::Progress { .. })) => continue,
                Poll::Ready(Some(ScanEvent::Done)) | Poll::Ready(None) => {
                    finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }))
    }

    /// Drain every match, then wait for the summary.
    pub async fn collect(mut self) -> (Vec<ScanResult>, Option<ScanSummary>) {
        let mut results = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                ScanEvent::Found(result) => results.push(result),
                ScanEvent::Progress { .. } => {}
                ScanEvent::Done => break,
            }
        }

        let summary = match self.task.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(error = %e, "Scan task did not complete");
                None
            }
        };
        (results, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn record(buyer: u8, seller: u8, approvals: u64) -> EscrowRecord {
        EscrowRecord {
            id: 9,
            buyer: Address::repeat_byte(buyer),
            seller: Address::repeat_byte(seller),
            amount_wei: U256::from(100u64),
            funded: true,
            approval_count: approvals,
        }
    }

    #[test]
    fn test_evaluate_participant() {
        let result = evaluate(record(0x0a, 0x0b, 0), Address::repeat_byte(0x0b), ScanMode::Dashboard, false)
            .unwrap();
        assert_eq!(result.kind, MatchKind::Participant(crate::blockchain::Role::Seller));
        assert_eq!(result.status, EscrowStatus::Funded);
        assert_eq!(result.id, 9);
    }

    #[test]
    fn test_evaluate_stranger() {
        let stranger = Address::repeat_byte(0x0c);
        assert!(evaluate(record(0x0a, 0x0b, 2), stranger, ScanMode::Movements, false).is_none());
    }

    #[test]
    fn test_evaluate_platform_view_matches_finalized_only() {
        let platform = Address::repeat_byte(0x0f);
        let settled = evaluate(record(0x0a, 0x0b, 1), platform, ScanMode::Movements, true).unwrap();
        assert_eq!(settled.kind, MatchKind::Platform);
        assert_eq!(settled.status, EscrowStatus::Finalized);

        assert!(evaluate(record(0x0a, 0x0b, 0), platform, ScanMode::Movements, true).is_none());
    }
}
