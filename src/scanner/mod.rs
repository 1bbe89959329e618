//! Record discovery.
//!
//! # Data Flow
//! ```text
//! scan(identity, address, mode)
//!     → walker.rs (background task: probe id 0, 1, 2, … with retry)
//!     → types.rs (classify, match, pending action)
//!     → mpsc channel (Progress / Found / Done) → ScanHandle
//! ```
//!
//! # Design Decisions
//! - Reads only; shares the chain client with the orchestrator
//! - Per-id failures are counted, never surfaced

pub mod types;
pub mod walker;

pub use types::{
    EscrowStatus, MatchKind, PendingAction, ScanEvent, ScanMode, ScanResult, ScanSummary,
};
pub use walker::{RecordScanner, ScanHandle};
