#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use twinflow_batch::adapters::batch::{JobBackend, JobTags};
use twinflow_batch::error::{Result, TwinflowError};
use twinflow_core::contract::{
    JobDefinitionSpec, JobHandle, JobStatus, JobSubmission, StatusRecord, TrackedJob,
    CORRELATION_KEY_TAG, DESCRIBE_JOBS_LIMIT,
};
use twinflow_core::error::ValidationError;

#[derive(Debug, Clone)]
pub struct FakeJob {
    pub handle: JobHandle,
    pub queue: String,
    pub status: JobStatus,
    pub tags: BTreeMap<String, String>,
    /// Status queries left before the job reports SUCCEEDED.
    pub polls_until_success: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    jobs: Vec<FakeJob>,
    next_id: u64,
    submit_completion: Option<u32>,
    throttled_calls: u32,
    describe_batches: Vec<usize>,
    terminated: Vec<(String, String)>,
    submissions: Vec<JobSubmission>,
    definitions: BTreeMap<String, Vec<u32>>,
    registered: Vec<JobDefinitionSpec>,
    advance_after_list: Vec<(String, JobStatus)>,
}

/// In-memory stand-in for AWS Batch.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake backend lock should not be poisoned")
    }

    /// Adds a job as if someone else had submitted it earlier.
    pub fn seed_job(&self, name: &str, queue: &str, status: JobStatus) -> String {
        self.seed_tagged_job(name, queue, status, None)
    }

    pub fn seed_tagged_job(
        &self,
        name: &str,
        queue: &str,
        status: JobStatus,
        correlation_key: Option<&str>,
    ) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let job_id = format!("seed-{}", state.next_id);
        let mut tags = BTreeMap::new();
        if let Some(key) = correlation_key {
            tags.insert(CORRELATION_KEY_TAG.to_string(), key.to_string());
        }
        state.jobs.push(FakeJob {
            handle: JobHandle::new(name, job_id.clone()),
            queue: queue.to_string(),
            status,
            tags,
            polls_until_success: None,
        });
        job_id
    }

    /// Seeds `count` running jobs that never finish and returns their ids.
    pub fn seed_running(&self, queue: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|index| self.seed_job(&format!("worker-{index}"), queue, JobStatus::Running))
            .collect()
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|job| job.handle.job_id == job_id) {
            job.status = status;
            job.polls_until_success = None;
        }
    }

    pub fn succeed_after_polls(&self, job_id: &str, polls: u32) {
        let mut state = self.state();
        if let Some(job) = state.jobs.iter_mut().find(|job| job.handle.job_id == job_id) {
            job.polls_until_success = Some(polls);
        }
    }

    /// Moves the job to `status` right after the next `list_jobs` call, as if
    /// it advanced between two listings.
    pub fn advance_after_next_list(&self, job_id: &str, status: JobStatus) {
        self.state()
            .advance_after_list
            .push((job_id.to_string(), status));
    }

    /// Jobs submitted from now on succeed after `polls` status queries.
    pub fn complete_submissions_after(&self, polls: u32) {
        self.state().submit_completion = Some(polls);
    }

    /// The next `calls` backend calls fail with a throttling error.
    pub fn throttle_next(&self, calls: u32) {
        self.state().throttled_calls = calls;
    }

    pub fn seed_definition_revisions(&self, name: &str, revisions: &[u32]) {
        self.state()
            .definitions
            .insert(name.to_string(), revisions.to_vec());
    }

    pub fn describe_batches(&self) -> Vec<usize> {
        self.state().describe_batches.clone()
    }

    pub fn terminated(&self) -> Vec<(String, String)> {
        self.state().terminated.clone()
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.state().submissions.clone()
    }

    pub fn registered(&self) -> Vec<JobDefinitionSpec> {
        self.state().registered.clone()
    }

    pub fn job(&self, job_id: &str) -> Option<FakeJob> {
        self.state()
            .jobs
            .iter()
            .find(|job| job.handle.job_id == job_id)
            .cloned()
    }

    pub fn active_definitions(&self, name: &str) -> Vec<u32> {
        self.state()
            .definitions
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn check_throttle(state: &mut State, operation: &str) -> Result<()> {
        if state.throttled_calls > 0 {
            state.throttled_calls -= 1;
            return Err(TwinflowError::remote(
                operation,
                "TooManyRequestsException: Too Many Requests",
            ));
        }
        Ok(())
    }

    fn check_limit(job_ids: &[String]) -> Result<()> {
        if job_ids.len() > DESCRIBE_JOBS_LIMIT {
            return Err(ValidationError::new(format!(
                "DescribeJobs accepts at most {DESCRIBE_JOBS_LIMIT} ids, got {}",
                job_ids.len()
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn submit_job(&self, submission: &JobSubmission) -> Result<JobHandle> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "SubmitJob")?;
        state.next_id += 1;
        let handle = JobHandle::new(&submission.job_name, format!("job-{}", state.next_id));
        let polls_until_success = state.submit_completion;
        state.jobs.push(FakeJob {
            handle: handle.clone(),
            queue: submission.job_queue.clone(),
            status: JobStatus::Submitted,
            tags: submission.tags.clone(),
            polls_until_success,
        });
        state.submissions.push(submission.clone());
        Ok(handle)
    }

    async fn describe_jobs(&self, job_ids: &[String]) -> Result<Vec<StatusRecord>> {
        Self::check_limit(job_ids)?;
        let mut state = self.state();
        Self::check_throttle(&mut state, "DescribeJobs")?;
        state.describe_batches.push(job_ids.len());

        let mut records = Vec::new();
        for job in state
            .jobs
            .iter_mut()
            .filter(|job| job_ids.contains(&job.handle.job_id))
        {
            if let Some(polls) = job.polls_until_success.as_mut() {
                *polls = polls.saturating_sub(1);
                if *polls == 0 {
                    job.status = JobStatus::Succeeded;
                    job.polls_until_success = None;
                }
            }
            records.push(StatusRecord::new(job.handle.job_id.clone(), job.status));
        }
        Ok(records)
    }

    async fn job_tags(&self, job_ids: &[String]) -> Result<HashMap<String, JobTags>> {
        Self::check_limit(job_ids)?;
        let mut state = self.state();
        Self::check_throttle(&mut state, "DescribeJobs")?;
        Ok(state
            .jobs
            .iter()
            .filter(|job| job_ids.contains(&job.handle.job_id))
            .map(|job| (job.handle.job_id.clone(), job.tags.clone()))
            .collect())
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<()> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "TerminateJob")?;
        state
            .terminated
            .push((job_id.to_string(), reason.to_string()));
        if let Some(job) = state.jobs.iter_mut().find(|job| job.handle.job_id == job_id) {
            job.status = JobStatus::Failed;
        }
        Ok(())
    }

    async fn list_jobs(&self, queue: &str, status: JobStatus) -> Result<Vec<TrackedJob>> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "ListJobs")?;
        let listed = state
            .jobs
            .iter()
            .filter(|job| job.queue == queue && job.status == status)
            .map(|job| TrackedJob::untagged(job.handle.clone()))
            .collect();

        let advances = std::mem::take(&mut state.advance_after_list);
        for (job_id, next) in advances {
            if let Some(job) = state.jobs.iter_mut().find(|job| job.handle.job_id == job_id) {
                job.status = next;
            }
        }
        Ok(listed)
    }

    async fn register_job_definition(&self, spec: &JobDefinitionSpec) -> Result<String> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "RegisterJobDefinition")?;
        let revisions = state.definitions.entry(spec.name.clone()).or_default();
        let revision = revisions.iter().max().copied().unwrap_or(0) + 1;
        revisions.push(revision);
        state.registered.push(spec.clone());
        Ok(format!(
            "arn:aws:batch:us-east-1:123456789012:job-definition/{}:{revision}",
            spec.name
        ))
    }

    async fn active_job_definitions(&self, name: &str) -> Result<Vec<String>> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "DescribeJobDefinitions")?;
        Ok(state
            .definitions
            .get(name)
            .map(|revisions| {
                revisions
                    .iter()
                    .map(|revision| format!("{name}:{revision}"))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn deregister_job_definition(&self, reference: &str) -> Result<()> {
        let mut state = self.state();
        Self::check_throttle(&mut state, "DeregisterJobDefinition")?;
        let Some((name, revision)) = reference.rsplit_once(':') else {
            return Err(TwinflowError::remote(
                "DeregisterJobDefinition",
                format!("ClientException: bad reference {reference}"),
            ));
        };
        let revision: u32 = revision.parse().map_err(|_| {
            TwinflowError::remote("DeregisterJobDefinition", "ClientException: bad revision")
        })?;
        if let Some(revisions) = state.definitions.get_mut(name) {
            revisions.retain(|active| *active != revision);
        }
        Ok(())
    }
}
