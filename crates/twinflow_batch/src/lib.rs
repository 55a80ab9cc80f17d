//! AWS Batch orchestration for twinflow workloads.
//!
//! Pure planning (job set diffs, poll bookkeeping, naming) lives in
//! `twinflow_core`; this crate owns the AWS adapters, the async flows built on
//! them, and the two binaries.

pub mod adapters;
pub mod config;
pub mod error;
pub mod handlers;
pub mod retry;
pub mod telemetry;
