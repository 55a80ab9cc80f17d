//! Shared twinflow job-orchestration primitives.
//!
//! This crate owns the deterministic parts of job reconciliation: the job
//! model, naming conventions, the job set differ, completion tracking, and
//! retry policy. It intentionally excludes AWS SDK and async runtime concerns;
//! those live in `twinflow_batch`.

pub mod contract;
pub mod error;
pub mod inventory;
pub mod naming;
pub mod poll;
pub mod reconcile;
pub mod retry;
