//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain read from the scanner:
//!     → retries.rs (repeat retryable failures within the attempt budget)
//!     → backoff.rs (fixed delay between attempts)
//!
//! Receipt wait in ChainClient::await_receipt:
//!     → backoff.rs (exponential delay between polls, capped)
//! ```
//!
//! # Design Decisions
//! - Policies are values handed to their users, not global settings
//! - Only transport failures are retried

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::RetryPolicy;
