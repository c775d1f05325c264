//! Radar Runtime
//!
//! Runs batches of source references through the pipeline:
//! - **Store**: in-memory profiles with an atomic insert-by-identity
//! - **Orchestrator**: worker pool with per-collaborator caps, retries with
//!   backoff, per-item timeouts and cooperative cancellation

pub mod config;
pub mod orchestrator;
pub mod retry;
pub mod store;

pub use config::*;
pub use orchestrator::*;
pub use retry::*;
pub use store::*;
