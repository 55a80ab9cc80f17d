use std::collections::HashSet;

use tracing::info;
use twinflow_core::contract::{JobHandle, JobStatus, JobSubmission, TrackedJob};
use twinflow_core::retry::RetryPolicy;

use crate::adapters::batch::JobBackend;
use crate::error::Result;
use crate::retry::with_backoff;

/// Every job in `queue` that has not reached a terminal status, in
/// status order (submitted first, running last). A job that advances between
/// two status listings is reported once, under the earlier status.
pub async fn list_active_jobs(
    backend: &dyn JobBackend,
    queue: &str,
    retry: &RetryPolicy,
) -> Result<Vec<TrackedJob>> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for status in JobStatus::ACTIVE {
        let page = with_backoff(retry, "ListJobs", || backend.list_jobs(queue, status)).await?;
        jobs.extend(
            page.into_iter()
                .filter(|job| seen.insert(job.handle.job_id.clone())),
        );
    }
    info!(queue, active = jobs.len(), "listed active jobs");
    Ok(jobs)
}

/// Requests termination of each job and returns the ids whose request was
/// accepted. Jobs may keep running for a while afterwards.
pub async fn kill_jobs(
    backend: &dyn JobBackend,
    job_ids: &[String],
    reason: &str,
    retry: &RetryPolicy,
) -> Result<Vec<String>> {
    let mut killed = Vec::with_capacity(job_ids.len());
    for job_id in job_ids {
        with_backoff(retry, "TerminateJob", || backend.terminate_job(job_id, reason)).await?;
        info!(job_id = %job_id, reason, "termination requested");
        killed.push(job_id.clone());
    }
    Ok(killed)
}

pub async fn submit_job(
    backend: &dyn JobBackend,
    submission: &JobSubmission,
    retry: &RetryPolicy,
) -> Result<JobHandle> {
    let handle = with_backoff(retry, "SubmitJob", || backend.submit_job(submission)).await?;
    info!(
        job_name = %handle.job_name,
        job_id = %handle.job_id,
        queue = %submission.job_queue,
        "job submitted"
    );
    Ok(handle)
}
