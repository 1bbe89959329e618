//! Local persistence.
//!
//! # Data Flow
//! ```text
//! Orchestrator step succeeds
//!     → store.rs (op.* keys in the operation slot)
//! Seller claim succeeds
//!     → completed.rs (separate store, never cleared with the slot)
//! ```

pub mod completed;
pub mod store;

pub use completed::CompletedIds;
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// File name of the operation slot inside `storage.state_dir`.
pub const OPERATION_FILE: &str = "operation.json";
/// File name of the completed id set inside `storage.state_dir`.
pub const COMPLETED_FILE: &str = "completed.json";
