use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_batch::types::{
    AssignPublicIp, ContainerOverrides, ContainerProperties, FargatePlatformConfiguration,
    JobDefinitionType, JobStatus as BatchJobStatus, JobTimeout, KeyValuePair, LogConfiguration,
    LogDriver, NetworkConfiguration, PlatformCapability, ResourceRequirement, ResourceType,
};
use twinflow_core::contract::{
    JobDefinitionSpec, JobHandle, JobStatus, JobSubmission, Platform, ResourceOverride,
    StatusRecord, TrackedJob, DESCRIBE_JOBS_LIMIT,
};
use twinflow_core::error::ValidationError;

use super::{number, present, remote_error, text};
use crate::error::{Result, TwinflowError};

pub type JobTags = BTreeMap<String, String>;

/// The slice of the AWS Batch API the orchestration handlers rely on.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit_job(&self, submission: &JobSubmission) -> Result<JobHandle>;

    /// Status of at most [`DESCRIBE_JOBS_LIMIT`] jobs.
    async fn describe_jobs(&self, job_ids: &[String]) -> Result<Vec<StatusRecord>>;

    /// Tags of at most [`DESCRIBE_JOBS_LIMIT`] jobs, keyed by job id.
    async fn job_tags(&self, job_ids: &[String]) -> Result<HashMap<String, JobTags>>;

    /// Requests termination; the backend stops the job asynchronously.
    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<()>;

    /// Every job in `queue` currently in `status`, across all result pages.
    async fn list_jobs(&self, queue: &str, status: JobStatus) -> Result<Vec<TrackedJob>>;

    /// Registers a new revision and returns its ARN.
    async fn register_job_definition(&self, spec: &JobDefinitionSpec) -> Result<String>;

    /// Active revisions of `name` as `name:revision` references.
    async fn active_job_definitions(&self, name: &str) -> Result<Vec<String>>;

    async fn deregister_job_definition(&self, reference: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AwsBatchBackend {
    client: aws_sdk_batch::Client,
}

impl AwsBatchBackend {
    pub fn new(client: aws_sdk_batch::Client) -> Self {
        Self { client }
    }
}

fn check_describe_limit(job_ids: &[String]) -> Result<()> {
    if job_ids.len() > DESCRIBE_JOBS_LIMIT {
        return Err(ValidationError::new(format!(
            "DescribeJobs accepts at most {DESCRIBE_JOBS_LIMIT} ids, got {}",
            job_ids.len()
        ))
        .into());
    }
    Ok(())
}

fn requirement(kind: ResourceType, value: u32) -> ResourceRequirement {
    ResourceRequirement::builder()
        .r#type(kind)
        .value(value.to_string())
        .build()
}

fn override_requirements(resources: &ResourceOverride) -> Vec<ResourceRequirement> {
    let mut requirements = Vec::new();
    if let Some(vcpus) = resources.vcpus {
        requirements.push(requirement(ResourceType::Vcpu, vcpus));
    }
    if let Some(memory_mib) = resources.memory_mib {
        requirements.push(requirement(ResourceType::Memory, memory_mib));
    }
    requirements
}

fn container_properties(spec: &JobDefinitionSpec) -> ContainerProperties {
    let mut requirements = vec![
        requirement(ResourceType::Vcpu, spec.vcpus),
        requirement(ResourceType::Memory, spec.memory_mib),
    ];
    if let Some(gpus) = spec.gpu_requirement() {
        requirements.push(requirement(ResourceType::Gpu, gpus));
    }

    let environment = spec
        .environment
        .iter()
        .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
        .collect::<Vec<_>>();

    let log_configuration = LogConfiguration::builder()
        .log_driver(LogDriver::from("awslogs"))
        .build();

    let role_arn = spec.execution_role_arn();
    let mut container = ContainerProperties::builder()
        .image(&spec.image)
        .set_command(Some(spec.command.clone()))
        .set_resource_requirements(Some(requirements))
        .set_environment(Some(environment))
        .set_execution_role_arn(role_arn.clone())
        .set_job_role_arn(role_arn)
        .log_configuration(log_configuration);

    if spec.platform == Platform::Fargate {
        container = container
            .fargate_platform_configuration(
                FargatePlatformConfiguration::builder()
                    .platform_version("LATEST")
                    .build(),
            )
            .network_configuration(
                NetworkConfiguration::builder()
                    .assign_public_ip(AssignPublicIp::from("ENABLED"))
                    .build(),
            );
    }

    container.build()
}

#[async_trait]
impl JobBackend for AwsBatchBackend {
    async fn submit_job(&self, submission: &JobSubmission) -> Result<JobHandle> {
        let mut request = self
            .client
            .submit_job()
            .job_name(&submission.job_name)
            .job_definition(&submission.job_definition)
            .job_queue(&submission.job_queue);

        if submission.command.is_some() || !submission.resources.is_empty() {
            let overrides = ContainerOverrides::builder()
                .set_command(submission.command.clone())
                .set_resource_requirements(Some(override_requirements(&submission.resources)))
                .build();
            request = request.container_overrides(overrides);
        }

        if !submission.tags.is_empty() {
            let tags: HashMap<String, String> = submission
                .tags
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            request = request.set_tags(Some(tags));
        }

        let output = request
            .send()
            .await
            .map_err(|error| remote_error("SubmitJob", error))?;
        let job_id = text(output.job_id()).ok_or_else(|| {
            TwinflowError::remote("SubmitJob", "response did not include a job id")
        })?;
        Ok(JobHandle::new(submission.job_name.clone(), job_id))
    }

    async fn describe_jobs(&self, job_ids: &[String]) -> Result<Vec<StatusRecord>> {
        check_describe_limit(job_ids)?;
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .client
            .describe_jobs()
            .set_jobs(Some(job_ids.to_vec()))
            .send()
            .await
            .map_err(|error| remote_error("DescribeJobs", error))?;

        let mut records = Vec::with_capacity(output.jobs().len());
        for detail in output.jobs() {
            let (Some(job_id), Some(status)) = (
                text(detail.job_id()),
                present::<BatchJobStatus>(detail.status()),
            ) else {
                continue;
            };
            records.push(StatusRecord::new(job_id, status.as_str().parse()?));
        }
        Ok(records)
    }

    async fn job_tags(&self, job_ids: &[String]) -> Result<HashMap<String, JobTags>> {
        check_describe_limit(job_ids)?;
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let output = self
            .client
            .describe_jobs()
            .set_jobs(Some(job_ids.to_vec()))
            .send()
            .await
            .map_err(|error| remote_error("DescribeJobs", error))?;

        Ok(output
            .jobs()
            .iter()
            .filter_map(|detail| {
                let job_id = text(detail.job_id())?;
                let tags: JobTags = detail
                    .tags()
                    .map(|tags| {
                        tags.iter()
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Some((job_id.to_string(), tags))
            })
            .collect())
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<()> {
        self.client
            .terminate_job()
            .job_id(job_id)
            .reason(reason)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("TerminateJob", error))
    }

    async fn list_jobs(&self, queue: &str, status: JobStatus) -> Result<Vec<TrackedJob>> {
        let mut pages = self
            .client
            .list_jobs()
            .job_queue(queue)
            .job_status(BatchJobStatus::from(status.as_str()))
            .into_paginator()
            .send();

        let mut jobs = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| remote_error("ListJobs", error))?;
            for summary in page.job_summary_list() {
                if let (Some(name), Some(id)) = (text(summary.job_name()), text(summary.job_id())) {
                    jobs.push(TrackedJob::untagged(JobHandle::new(name, id)));
                }
            }
        }
        Ok(jobs)
    }

    async fn register_job_definition(&self, spec: &JobDefinitionSpec) -> Result<String> {
        let mut request = self
            .client
            .register_job_definition()
            .job_definition_name(&spec.name)
            .r#type(JobDefinitionType::from("container"))
            .container_properties(container_properties(spec))
            .platform_capabilities(PlatformCapability::from(spec.platform.as_str()));

        if spec.timeout_secs > 0 {
            let seconds = i32::try_from(spec.timeout_secs).unwrap_or(i32::MAX);
            request = request.timeout(JobTimeout::builder().attempt_duration_seconds(seconds).build());
        }

        let output = request
            .send()
            .await
            .map_err(|error| remote_error("RegisterJobDefinition", error))?;
        text(output.job_definition_arn())
            .map(str::to_string)
            .ok_or_else(|| {
                TwinflowError::remote(
                    "RegisterJobDefinition",
                    "response did not include a job definition arn",
                )
            })
    }

    async fn active_job_definitions(&self, name: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .describe_job_definitions()
            .job_definition_name(name)
            .status("ACTIVE")
            .send()
            .await
            .map_err(|error| remote_error("DescribeJobDefinitions", error))?;

        Ok(output
            .job_definitions()
            .iter()
            .filter_map(|definition| {
                let name = text(definition.job_definition_name())?;
                let revision = number::<i32>(definition.revision())?;
                Some(format!("{name}:{revision}"))
            })
            .collect())
    }

    async fn deregister_job_definition(&self, reference: &str) -> Result<()> {
        self.client
            .deregister_job_definition()
            .job_definition(reference)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("DeregisterJobDefinition", error))
    }
}
