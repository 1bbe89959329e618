//! Chain access: contract reads, raw transaction broadcast, receipts.
//!
//! # Responsibilities
//! - Connect to one primary and any number of failover JSON-RPC endpoints
//! - Bound every call with the configured timeout
//! - Separate transient transport failures from chain rejections
//! - Map `getEscrow` results onto [`EscrowRecord`], treating unused ids as not found

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};

use crate::blockchain::contract::getEscrowCall;
use crate::blockchain::types::{EscrowRecord, Receipt, ReceiptLog};
use crate::config::ChainConfig;
use crate::error::{EscrowError, EscrowResult};
use crate::observability::metrics;
use crate::resilience::Backoff;

/// Chain operations the orchestrator and scanner depend on.
///
/// Implementations must be safe for concurrent read use.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Read escrow `id`. Unused ids yield [`EscrowError::NotFound`].
    async fn read_escrow(&self, id: u64) -> EscrowResult<EscrowRecord>;

    /// Pending transaction count for `address`.
    async fn nonce(&self, address: Address) -> EscrowResult<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> EscrowResult<u128>;

    /// Broadcast a signed, EIP-2718 encoded transaction.
    async fn broadcast(&self, raw: Bytes) -> EscrowResult<TxHash>;

    /// Receipt for `tx_hash`, or `None` while it is pending.
    async fn receipt(&self, tx_hash: TxHash) -> EscrowResult<Option<Receipt>>;

    /// Poll for a receipt until it appears or `wait` elapses, spacing polls
    /// by `poll`.
    ///
    /// Transient errors while polling are logged and polling continues.
    async fn await_receipt(
        &self,
        tx_hash: TxHash,
        wait: Duration,
        poll: Backoff,
    ) -> EscrowResult<Receipt> {
        let deadline = Instant::now() + wait;
        let mut attempt = 0;

        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => tracing::debug!(tx_hash = %tx_hash, attempt = attempt, "Transaction pending"),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed, polling again")
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EscrowError::NotMined {
                    tx_hash: tx_hash.to_string(),
                    secs: wait.as_secs(),
                });
            }
            attempt += 1;
            sleep(poll.delay(attempt).min(deadline - now)).await;
        }
    }
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC backed [`ChainClient`] with failover.
#[derive(Clone)]
pub struct RpcChainClient {
    /// Primary provider first, then failovers.
    providers: Vec<DynProvider>,
    contract: Address,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Connect to the configured endpoints.
    ///
    /// A chain-id mismatch is logged, not fatal, so the client still works
    /// against nodes that are temporarily unreachable at startup.
    pub async fn new(config: ChainConfig) -> EscrowResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let contract: Address = config.contract_address.parse().map_err(|e| {
            EscrowError::InvalidInput(format!(
                "Invalid contract address '{}': {}",
                config.contract_address, e
            ))
        })?;

        let mut providers = Vec::new();
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            EscrowError::InvalidInput(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            contract,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                rpc_url = %config.rpc_url,
                chain_id = config.chain_id,
                contract = %contract,
                "Chain client initialized"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Chain client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> EscrowResult<()> {
        let actual = self
            .with_failover("get chain id", |p| async move { p.get_chain_id().await })
            .await?;
        if actual != self.config.chain_id {
            return Err(EscrowError::InvalidInput(format!(
                "Chain ID mismatch: expected {}, got {}",
                self.config.chain_id, actual
            )));
        }
        Ok(())
    }

    /// True if any endpoint answers a block-number query.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self
            .with_failover("get block number", |p| async move { p.get_block_number().await })
            .await
            .is_ok();
        metrics::record_rpc_health(healthy);
        healthy
    }

    /// Escrow contract address.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// The configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run `op` against each provider in turn until one answers.
    ///
    /// A JSON-RPC error response is a chain verdict and is returned as-is;
    /// only transport failures and timeouts move on to the next provider.
    async fn with_failover<T, F, Fut>(&self, what: &'static str, op: F) -> EscrowResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut last_error = String::from("no providers configured");
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => match classify_rpc_error(&e) {
                    err @ EscrowError::Contract(_) => return Err(err),
                    err => {
                        tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                        last_error = err.to_string();
                    }
                },
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                    last_error = format!("timeout after {}s", self.timeout_duration.as_secs());
                }
            }
        }
        Err(EscrowError::Network(format!(
            "All RPC providers failed to {}: {}",
            what, last_error
        )))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn read_escrow(&self, id: u64) -> EscrowResult<EscrowRecord> {
        let call = getEscrowCall {
            escrowId: U256::from(id),
        };
        let request = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(call.abi_encode());

        let output = self
            .with_failover("read escrow", |p| {
                let request = request.clone();
                async move { p.call(request).await }
            })
            .await?;

        decode_escrow(id, &output)
    }

    async fn nonce(&self, address: Address) -> EscrowResult<u64> {
        self.with_failover("get transaction count", |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    async fn gas_price(&self) -> EscrowResult<u128> {
        self.with_failover("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn broadcast(&self, raw: Bytes) -> EscrowResult<TxHash> {
        // Primary only. A failover would answer "already known" for a payload
        // the primary accepted before timing out.
        let provider = &self.providers[0];
        match timeout(self.timeout_duration, provider.send_raw_transaction(&raw)).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => Err(classify_rpc_error(&e)),
            Err(_) => Err(EscrowError::Network(format!(
                "Broadcast timed out after {}s",
                self.timeout_duration.as_secs()
            ))),
        }
    }

    async fn receipt(&self, tx_hash: TxHash) -> EscrowResult<Option<Receipt>> {
        let receipt = self
            .with_failover("get receipt", |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;
        Ok(receipt.map(convert_receipt))
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("contract", &self.contract)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

/// JSON-RPC error responses carry the node's verdict; everything else is transport.
fn classify_rpc_error(err: &TransportError) -> EscrowError {
    match err.as_error_resp() {
        Some(payload) => EscrowError::Contract(payload.message.to_string()),
        None => EscrowError::Network(err.to_string()),
    }
}

/// Decode `getEscrow` output. Unused ids come back zeroed; both parties zero
/// is the only signal the contract gives that the slot was never written.
pub(crate) fn decode_escrow(id: u64, output: &[u8]) -> EscrowResult<EscrowRecord> {
    if output.is_empty() {
        return Err(EscrowError::NotFound(id));
    }

    let decoded = getEscrowCall::abi_decode_returns(output)
        .map_err(|e| EscrowError::Contract(format!("Undecodable getEscrow response: {}", e)))?;

    if decoded.buyer == Address::ZERO && decoded.seller == Address::ZERO {
        return Err(EscrowError::NotFound(id));
    }

    let approval_count = u64::try_from(decoded.approvalCount).map_err(|_| {
        EscrowError::Contract(format!("Approval count out of range for escrow {}", id))
    })?;

    Ok(EscrowRecord {
        id,
        buyer: decoded.buyer,
        seller: decoded.seller,
        amount_wei: decoded.amount,
        funded: decoded.isFunded,
        approval_count,
    })
}

fn convert_receipt(receipt: TransactionReceipt) -> Receipt {
    let logs = receipt
        .inner
        .logs()
        .iter()
        .map(|log| ReceiptLog {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        })
        .collect();

    Receipt {
        tx_hash: receipt.transaction_hash,
        success: receipt.status(),
        block_number: receipt.block_number,
        logs,
    }
}
