//! Transaction building, signing and broadcast.
//!
//! # Responsibilities
//! - Fetch nonce and gas price for the sender
//! - Build a legacy transaction against the escrow contract with a fixed gas ceiling
//! - Sign locally and broadcast the raw payload
//!
//! No retry happens here; callers decide whether a failed step is repeated.

use std::sync::Arc;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;

use crate::blockchain::client::ChainClient;
use crate::blockchain::wallet::Wallet;
use crate::config::ChainConfig;
use crate::error::{EscrowError, EscrowResult};
use crate::observability::metrics;

/// Signs and broadcasts escrow contract calls.
#[derive(Clone)]
pub struct TxSubmitter {
    chain: Arc<dyn ChainClient>,
    contract: Address,
    chain_id: u64,
    gas_limit: u64,
}

impl TxSubmitter {
    /// Create a submitter for `contract` on `chain_id`.
    pub fn new(chain: Arc<dyn ChainClient>, contract: Address, chain_id: u64, gas_limit: u64) -> Self {
        Self {
            chain,
            contract,
            chain_id,
            gas_limit,
        }
    }

    /// Create a submitter from chain configuration.
    pub fn from_config(chain: Arc<dyn ChainClient>, config: &ChainConfig) -> EscrowResult<Self> {
        let contract: Address = config.contract_address.parse().map_err(|e| {
            EscrowError::InvalidInput(format!(
                "Invalid contract address '{}': {}",
                config.contract_address, e
            ))
        })?;
        Ok(Self::new(chain, contract, config.chain_id, config.gas_limit))
    }

    /// Sign `call` with `sender_key` and broadcast it with `value` wei attached.
    pub async fn submit<C: SolCall>(
        &self,
        sender_key: &str,
        call: &C,
        value: U256,
    ) -> EscrowResult<TxHash> {
        let wallet = Wallet::from_private_key(sender_key)?;
        self.submit_with(&wallet, call, value).await
    }

    /// Same as [`submit`](Self::submit) with an already parsed wallet.
    pub async fn submit_with<C: SolCall>(
        &self,
        wallet: &Wallet,
        call: &C,
        value: U256,
    ) -> EscrowResult<TxHash> {
        let from = wallet.address();

        // 1. Nonce, then gas price, from the chain
        let nonce = self.chain.nonce(from).await?;
        let gas_price = self.chain.gas_price().await?;

        // 2. Raw transaction with the fixed ceiling
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(self.contract)
            .with_value(value)
            .with_input(call.abi_encode())
            .with_nonce(nonce)
            .with_gas_price(gas_price)
            .with_gas_limit(self.gas_limit)
            .with_chain_id(self.chain_id);

        // 3. Sign
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(
            request,
            &wallet.network_wallet(),
        )
        .await
        .map_err(|e| EscrowError::Signing(format!("Signing failed: {}", e)))?;
        let raw = envelope.encoded_2718();

        // 4. Broadcast
        let tx_hash = self.chain.broadcast(raw.into()).await?;

        metrics::record_tx_submitted(C::SIGNATURE);
        tracing::info!(
            tx_hash = %tx_hash,
            from = %from,
            function = C::SIGNATURE,
            nonce = nonce,
            "Transaction broadcast"
        );

        Ok(tx_hash)
    }

    /// Escrow contract address.
    pub fn contract(&self) -> Address {
        self.contract
    }
}

impl std::fmt::Debug for TxSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSubmitter")
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .field("gas_limit", &self.gas_limit)
            .finish()
    }
}
