use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapters::queue::MessageQueue;
use crate::error::Result;

/// Longest wait a single SQS receive accepts.
pub const MAX_LONG_POLL_SECS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSettings {
    pub wait_secs: u32,
    /// Purge the whole queue on arrival instead of deleting what was received.
    pub purge: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            wait_secs: MAX_LONG_POLL_SECS,
            purge: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "receipt_handles", rename_all = "snake_case")]
pub enum WatchOutcome {
    /// Receipt handles of the deleted messages; empty after a purge.
    Received(Vec<String>),
    Cancelled,
}

/// Blocks until the queue yields at least one message.
pub async fn watch_queue(
    queue: &dyn MessageQueue,
    settings: &WatchSettings,
    cancel: &CancellationToken,
) -> Result<WatchOutcome> {
    let long_poll = settings.wait_secs.min(MAX_LONG_POLL_SECS);
    let pause = Duration::from_secs(u64::from(settings.wait_secs - long_poll));

    loop {
        let messages = tokio::select! {
            _ = cancel.cancelled() => return Ok(WatchOutcome::Cancelled),
            received = queue.receive(long_poll) => received?,
        };

        if !messages.is_empty() {
            if settings.purge {
                queue.purge().await?;
                info!(received = messages.len(), "queue purged");
                return Ok(WatchOutcome::Received(Vec::new()));
            }

            let mut handles = Vec::with_capacity(messages.len());
            for message in messages {
                queue.delete(&message.receipt_handle).await?;
                handles.push(message.receipt_handle);
            }
            info!(received = handles.len(), "messages consumed");
            return Ok(WatchOutcome::Received(handles));
        }

        debug!(pause_secs = pause.as_secs(), "queue empty");
        if !pause.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(WatchOutcome::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
