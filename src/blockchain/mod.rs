//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! KeySource (environment)
//!     → wallet.rs (key parsing, address derivation)
//!     → transaction.rs (nonce, gas price, sign, broadcast)
//!     → client.rs (JSON-RPC with timeouts and failover)
//!     → events.rs (receipt wait, EscrowCreated decoding)
//! ```
//!
//! # Security Constraints
//! - Private keys never logged
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod contract;
pub mod events;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{ChainClient, RpcChainClient};
pub use events::EventAwaiter;
pub use transaction::TxSubmitter;
pub use types::{EscrowRecord, Receipt, ReceiptLog, Role, COMPLETION_THRESHOLD};
pub use wallet::{EnvKeySource, KeySource, Wallet};
