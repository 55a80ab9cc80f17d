use std::collections::HashSet;

use crate::contract::{StatusRecord, DESCRIBE_JOBS_LIMIT};

/// Outstanding-job bookkeeping for the completion poller.
///
/// Holds the de-duplicated ids still awaiting a terminal status. An id leaves
/// the set only when a status round reports it terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTracker {
    total: usize,
    remaining: Vec<String>,
    rounds: u64,
}

impl PollTracker {
    pub fn new<I, S>(job_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let remaining: Vec<String> = job_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            total: remaining.len(),
            remaining,
            rounds: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> &[String] {
        &self.remaining
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Outstanding ids split into status-query sized chunks.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.remaining
            .chunks(DESCRIBE_JOBS_LIMIT)
            .map(<[String]>::to_vec)
            .collect()
    }

    /// Drops every outstanding id reported terminal; returns how many left.
    /// Records for ids that are not outstanding are ignored.
    pub fn observe(&mut self, records: &[StatusRecord]) -> usize {
        let finished: HashSet<&str> = records
            .iter()
            .filter(|record| record.status.is_terminal())
            .map(|record| record.job_id.as_str())
            .collect();
        let before = self.remaining.len();
        self.remaining.retain(|id| !finished.contains(id.as_str()));
        before - self.remaining.len()
    }

    pub fn finish_round(&mut self) -> u64 {
        self.rounds += 1;
        self.rounds
    }

    pub fn should_report(&self, every_rounds: u64) -> bool {
        every_rounds > 0 && self.rounds > 0 && self.rounds % every_rounds == 0
    }

    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (1.0 - self.remaining.len() as f64 / self.total as f64) * 100.0
    }
}
