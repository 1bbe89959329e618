//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator, scanner, submitter, RPC client:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges through the metrics facade)
//!
//! Consumers:
//!     → stderr log output
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Fields over interpolated messages
//! - Private keys and raw signed payloads are never recorded

pub mod logging;
pub mod metrics;
