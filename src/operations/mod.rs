//! Resumable escrow operations.
//!
//! # Data Flow
//! ```text
//! Caller step (direct or spawn_step)
//!     → orchestrator.rs (step lock, submit / await / read)
//!     → state.rs (op.* slot written before success is reported)
//! ```

pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    BuyerStatus, Orchestrator, SellerStatus, Step, StepOutput, StepReport, Verification,
};
pub use state::{OperationState, Phase};
