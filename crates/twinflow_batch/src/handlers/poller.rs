//! Completion poller.
//!
//! Each round queries every outstanding job in chunks of at most 100 ids,
//! drops the ones that reached a terminal status, then sleeps for the poll
//! interval. The wait ends when nothing is outstanding, when the optional
//! maximum wait elapses, or when the caller cancels.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use twinflow_core::poll::PollTracker;
use twinflow_core::retry::RetryPolicy;

use crate::adapters::batch::JobBackend;
use crate::error::Result;
use crate::retry::with_backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Log progress every this many rounds; zero disables progress lines.
    pub report_every_rounds: u64,
    pub max_wait: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            report_every_rounds: 50,
            max_wait: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    Completed { rounds: u64 },
    TimedOut { remaining: Vec<String> },
    Cancelled { remaining: Vec<String> },
}

impl WaitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

pub async fn wait_for_jobs<I, S>(
    backend: &dyn JobBackend,
    job_ids: I,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<WaitOutcome>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tracker = PollTracker::new(job_ids);
    let deadline = settings.max_wait.map(|wait| Instant::now() + wait);
    info!(jobs = tracker.total(), "waiting for jobs to finish");

    loop {
        if tracker.is_done() {
            info!(rounds = tracker.rounds(), "all jobs finished");
            return Ok(WaitOutcome::Completed {
                rounds: tracker.rounds(),
            });
        }
        if cancel.is_cancelled() {
            return Ok(cancelled(&tracker));
        }

        // A throttled query may back off for a long time; the deadline and the
        // token still apply while it does.
        for batch in tracker.batches() {
            let query =
                with_backoff(&settings.retry, "DescribeJobs", || backend.describe_jobs(&batch));
            let records = tokio::select! {
                records = query => records?,
                _ = cancel.cancelled() => return Ok(cancelled(&tracker)),
                _ = expiry(deadline) => return Ok(timed_out(&tracker)),
            };
            tracker.observe(&records);
        }
        tracker.finish_round();

        if tracker.is_done() {
            continue;
        }
        if tracker.should_report(settings.report_every_rounds) {
            info!(
                remaining = tracker.remaining().len(),
                fraction_done = tracker.percent_done() / 100.0,
                "{:.2}% of jobs have completed.",
                tracker.percent_done()
            );
        }

        let mut wake = Instant::now() + settings.interval;
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Ok(timed_out(&tracker));
            }
            wake = wake.min(deadline);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(cancelled(&tracker)),
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}

/// Resolves at the deadline, or never when there is none.
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn timed_out(tracker: &PollTracker) -> WaitOutcome {
    info!(
        remaining = tracker.remaining().len(),
        "stopped waiting at the deadline"
    );
    WaitOutcome::TimedOut {
        remaining: tracker.remaining().to_vec(),
    }
}

fn cancelled(tracker: &PollTracker) -> WaitOutcome {
    info!(remaining = tracker.remaining().len(), "wait cancelled");
    WaitOutcome::Cancelled {
        remaining: tracker.remaining().to_vec(),
    }
}
