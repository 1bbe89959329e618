//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EscrowConfig (validated, immutable)
//!     → handed to the chain client, orchestrator and scanner at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ChainConfig;
pub use schema::DisputeConfig;
pub use schema::EscrowConfig;
pub use schema::ObservabilityConfig;
pub use schema::OrchestratorConfig;
pub use schema::ScannerConfig;
pub use schema::StorageConfig;
