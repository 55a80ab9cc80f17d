//! One reconciliation pass: converge the sensor jobs in a queue to the work
//! items present in the object store.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;
use twinflow_core::contract::{
    JobDefinitionSpec, JobHandle, JobSubmission, ResourceOverride, TrackedJob,
    DEFAULT_KILL_REASON, DESCRIBE_JOBS_LIMIT, REPORT_SCHEMA_VERSION,
};
use twinflow_core::inventory::{work_items, WorkItem};
use twinflow_core::naming::{has_job_prefix, job_name};
use twinflow_core::reconcile::plan_reconciliation;
use twinflow_core::retry::RetryPolicy;

use crate::adapters::batch::JobBackend;
use crate::adapters::object_store::ObjectInventory;
use crate::error::Result;
use crate::handlers::active_jobs::{kill_jobs, list_active_jobs, submit_job};
use crate::handlers::job_definition::define_job;
use crate::retry::with_backoff;

pub const DEFAULT_JOB_PREFIX: &str = "twinflow-batch-virtual-sensor";
pub const DEFAULT_JOB_DEFINITION: &str = "virtual-sensor-base_definition";
pub const DEFAULT_ITEM_PREFIX: &str = "DG-NG-sensor-data/";

/// Sensor command; `{object_key}`, `{bucket}` and `{ansys_server}` are
/// substituted per item.
pub const DEFAULT_SENSOR_COMMAND: [&str; 8] = [
    "python",
    "virtual_sensor.py",
    "-i",
    "{object_key}",
    "-s",
    "{bucket}",
    "--ansys_server",
    "{ansys_server}",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleSettings {
    pub job_queue: String,
    pub bucket: String,
    pub item_prefix: String,
    pub job_prefix: String,
    pub job_definition: JobDefinitionSpec,
    pub command_template: Vec<String>,
    pub ansys_server: String,
    #[serde(default)]
    pub resources: ResourceOverride,
    pub submit_concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub schema_version: String,
    pub job_queue: String,
    pub killed: Vec<JobHandle>,
    pub submitted: Vec<JobHandle>,
    pub unchanged: usize,
    pub snapshot_fingerprint: String,
    pub generated_at: String,
}

pub fn sensor_command(
    template: &[String],
    object_key: &str,
    bucket: &str,
    ansys_server: &str,
) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace("{object_key}", object_key)
                .replace("{bucket}", bucket)
                .replace("{ansys_server}", ansys_server)
        })
        .collect()
}

pub fn sensor_submission(settings: &AutoscaleSettings, item: &WorkItem) -> JobSubmission {
    JobSubmission::new(
        job_name(&settings.job_prefix, item.key),
        &settings.job_definition.name,
        &settings.job_queue,
    )
    .with_command(sensor_command(
        &settings.command_template,
        &item.object_key,
        &settings.bucket,
        &settings.ansys_server,
    ))
    .with_resources(settings.resources.clone())
    .with_correlation_key(item.key)
}

pub async fn run_autoscale(
    backend: &dyn JobBackend,
    inventory: &dyn ObjectInventory,
    settings: &AutoscaleSettings,
) -> Result<ReconcileReport> {
    let retry = &settings.retry;
    define_job(backend, &settings.job_definition, retry).await?;

    let active = list_active_jobs(backend, &settings.job_queue, retry).await?;
    let tracked = with_correlation_tags(backend, active, &settings.job_prefix, retry).await?;

    let objects = inventory.list_objects(&settings.item_prefix).await?;
    let expected = work_items(&objects)?;

    let plan = plan_reconciliation(&tracked, &expected, &settings.job_prefix)?;
    info!(
        queue = %settings.job_queue,
        tracked = tracked.len(),
        expected = expected.len(),
        kill = plan.kill.len(),
        submit = plan.submit.len(),
        unchanged = plan.unchanged.len(),
        "reconciliation planned"
    );

    let kill_ids: Vec<String> = plan.kill.iter().map(|job| job.job_id.clone()).collect();
    kill_jobs(backend, &kill_ids, DEFAULT_KILL_REASON, retry).await?;

    let submissions: Vec<JobSubmission> = plan
        .submit
        .iter()
        .map(|item| sensor_submission(settings, item))
        .collect();
    let mut submitted: Vec<JobHandle> = stream::iter(submissions.iter())
        .map(|submission| submit_job(backend, submission, retry))
        .buffer_unordered(settings.submit_concurrency.max(1))
        .try_collect()
        .await?;
    submitted.sort_by(|left, right| left.job_name.cmp(&right.job_name));

    Ok(ReconcileReport {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        job_queue: settings.job_queue.clone(),
        killed: plan.kill,
        submitted,
        unchanged: plan.unchanged.len(),
        snapshot_fingerprint: plan.snapshot_fingerprint,
        generated_at: Utc::now().to_rfc3339(),
    })
}

/// Listing does not return tags, so prefixed jobs are described in chunks to
/// pick up their correlation tag. Jobs outside the prefix are dropped.
async fn with_correlation_tags(
    backend: &dyn JobBackend,
    active: Vec<TrackedJob>,
    job_prefix: &str,
    retry: &RetryPolicy,
) -> Result<Vec<TrackedJob>> {
    let mut tracked: Vec<TrackedJob> = active
        .into_iter()
        .filter(|job| has_job_prefix(&job.handle.job_name, job_prefix))
        .collect();

    let ids: Vec<String> = tracked.iter().map(|job| job.handle.job_id.clone()).collect();
    for chunk in ids.chunks(DESCRIBE_JOBS_LIMIT) {
        let mut tags = with_backoff(retry, "DescribeJobs", || backend.job_tags(chunk)).await?;
        for job in tracked
            .iter_mut()
            .filter(|job| chunk.contains(&job.handle.job_id))
        {
            if let Some(job_tags) = tags.remove(&job.handle.job_id) {
                job.tags = job_tags;
            }
        }
    }
    Ok(tracked)
}
