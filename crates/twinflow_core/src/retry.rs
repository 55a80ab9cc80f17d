use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Substrings the AWS APIs use when a caller is being rate limited.
pub const THROTTLING_MARKERS: [&str; 4] = [
    "Too Many Requests",
    "TooManyRequestsException",
    "ThrottlingException",
    "Rate exceeded",
];

const ALREADY_EXISTS_MARKERS: [&str; 4] = [
    "already exists",
    "AlreadyExists",
    "BucketAlreadyOwnedByYou",
    "EntityAlreadyExists",
];

const ALREADY_GONE_MARKERS: [&str; 4] = [
    "QueueDoesNotExist",
    "NonExistentQueue",
    "NoSuchBucket",
    "NoSuchEntity",
];

/// How a failed remote call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limited; retry after a backoff.
    Throttled,
    /// Create call for something that is already there.
    AlreadyExists,
    /// Delete call for something that is already gone.
    AlreadyGone,
    Fatal,
}

impl ErrorClass {
    pub fn of(message: &str) -> Self {
        if THROTTLING_MARKERS.iter().any(|marker| message.contains(marker)) {
            Self::Throttled
        } else if ALREADY_EXISTS_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            Self::AlreadyExists
        } else if ALREADY_GONE_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
        {
            Self::AlreadyGone
        } else {
            Self::Fatal
        }
    }

    /// Idempotent outcomes that callers report as success.
    pub fn is_success_equivalent(self) -> bool {
        matches!(self, Self::AlreadyExists | Self::AlreadyGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (zero-based):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
