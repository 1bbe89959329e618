//! Escrow orchestrator library.
//!
//! Drives multi-step escrow deposits against an on-chain escrow contract
//! and discovers the records that concern a wallet.

pub mod blockchain;
pub mod config;
pub mod disputes;
pub mod error;
pub mod observability;
pub mod operations;
pub mod resilience;
pub mod scanner;
pub mod storage;

pub use config::EscrowConfig;
pub use error::{EscrowError, EscrowResult};
pub use operations::Orchestrator;
pub use scanner::RecordScanner;
