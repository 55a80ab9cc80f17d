#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use twinflow_batch::adapters::queue::{MessageQueue, QueueMessage};
use twinflow_batch::error::Result;

#[derive(Debug, Default)]
struct State {
    /// One entry per receive call; empty entries model an empty poll.
    deliveries: VecDeque<Vec<QueueMessage>>,
    receive_waits: Vec<u32>,
    deleted: Vec<String>,
    purges: usize,
}

/// Scripted queue. Empty receives sleep for the requested long-poll wait.
#[derive(Debug, Default)]
pub struct FakeQueue {
    state: Mutex<State>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake queue lock should not be poisoned")
    }

    pub fn push_empty_polls(&self, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.deliveries.push_back(Vec::new());
        }
    }

    pub fn push_messages(&self, receipt_handles: &[&str]) {
        self.state().deliveries.push_back(
            receipt_handles
                .iter()
                .map(|handle| QueueMessage {
                    receipt_handle: handle.to_string(),
                    body: Some(format!("{{\"object\":\"{handle}\"}}")),
                })
                .collect(),
        );
    }

    pub fn receive_waits(&self) -> Vec<u32> {
        self.state().receive_waits.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn purges(&self) -> usize {
        self.state().purges
    }
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn receive(&self, wait_secs: u32) -> Result<Vec<QueueMessage>> {
        let delivery = {
            let mut state = self.state();
            state.receive_waits.push(wait_secs);
            state.deliveries.pop_front().unwrap_or_default()
        };
        if delivery.is_empty() {
            tokio::time::sleep(Duration::from_secs(u64::from(wait_secs))).await;
        }
        Ok(delivery)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.state().deleted.push(receipt_handle.to_string());
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        self.state().purges += 1;
        Ok(())
    }
}
