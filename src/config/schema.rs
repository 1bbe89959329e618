//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the escrow orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EscrowConfig {
    /// Chain RPC and contract settings.
    pub chain: ChainConfig,

    /// Buyer/seller step machine settings.
    pub orchestrator: OrchestratorConfig,

    /// Sequential discovery settings.
    pub scanner: ScannerConfig,

    /// Local state location.
    pub storage: StorageConfig,

    /// Dispute ledger endpoint.
    pub disputes: DisputeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID used for EIP-155 signing (11155111 for Sepolia, 31337 for Anvil).
    pub chain_id: u64,

    /// Address of the escrow contract.
    pub contract_address: String,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Gas limit ceiling applied to every contract call.
    pub gas_limit: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 11_155_111,
            contract_address: "0xa6e8ec1458dd40bcc9e3aeec38bdf7488ad302be".to_string(),
            rpc_timeout_secs: 10,
            gas_limit: 300_000,
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long to wait for a creation receipt, in seconds.
    pub receipt_timeout_secs: u64,

    /// First receipt polling delay in milliseconds. Doubles on each poll.
    pub receipt_poll_ms: u64,

    /// Ceiling for the receipt polling delay in milliseconds.
    pub receipt_poll_max_ms: u64,

    /// Suggested wait after `create` before resolving the id.
    pub create_grace_secs: u64,

    /// Suggested wait after `fund` or `approve` before the next step.
    pub fund_grace_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 60,
            receipt_poll_ms: 1000,
            receipt_poll_max_ms: 8000,
            create_grace_secs: 15,
            fund_grace_secs: 19,
        }
    }
}

/// Scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Attempts per id on network failure.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_backoff_ms: u64,

    /// Consecutive misses that end a dashboard scan.
    pub dashboard_failure_threshold: u32,

    /// Consecutive misses that end a movement scan.
    pub movement_failure_threshold: u32,

    /// Pause between probes in milliseconds.
    pub probe_interval_ms: u64,

    /// Emit a progress event every N probes (0 disables).
    pub progress_every: u64,

    /// Platform wallet; movement scans from it list every finalized escrow.
    pub platform_address: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 200,
            dashboard_failure_threshold: 5,
            movement_failure_threshold: 3,
            probe_interval_ms: 100,
            progress_every: 5,
            platform_address: None,
        }
    }
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `operation.json` and `completed.json`.
    pub state_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: ".escrow-state".to_string(),
        }
    }
}

/// Dispute ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisputeConfig {
    /// Base URL of the dispute ledger service. Disputes are unavailable when unset.
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 15,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
