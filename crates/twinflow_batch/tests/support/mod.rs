#![allow(dead_code)]

pub mod backend;
pub mod inventory;
pub mod queue;

use std::time::Duration;

use twinflow_core::retry::RetryPolicy;

/// Short backoff so throttling tests stay fast even without paused time.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(80),
    }
}
