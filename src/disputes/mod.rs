//! Disputes.
//!
//! # Data Flow
//! ```text
//! open:    chain read (role check) → ledger.rs (file)
//! list:    ledger.rs → types.rs (group by record)
//! resolve: orchestrator resolve_dispute (chain) → ledger.rs (best effort)
//! ```

pub mod desk;
pub mod ledger;
pub mod types;

pub use desk::DisputeDesk;
pub use ledger::{DisputeLedger, HttpDisputeLedger};
pub use types::{Decision, DisputeEntry, DisputeStatus, DisputeSummary, NewDispute};
