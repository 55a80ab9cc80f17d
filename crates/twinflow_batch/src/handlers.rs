//! Orchestration flows built on the adapter traits.

pub mod active_jobs;
pub mod autoscale;
pub mod evaluate;
pub mod job_definition;
pub mod poller;
pub mod queue_watch;
