use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StatusError, ValidationError};

pub const REPORT_SCHEMA_VERSION: &str = "v1";
/// Upper bound on job ids accepted by one Batch `DescribeJobs` call.
pub const DESCRIBE_JOBS_LIMIT: usize = 100;
pub const CORRELATION_KEY_TAG: &str = "twinflow:correlation-key";
pub const DEFAULT_KILL_REASON: &str = "No longer needed.";

/// Application-level identifier that ties a job to the work item it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(pub u64);

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name and backend id of a submitted job. Only `job_id` is used for status
/// queries, kill requests, and set membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_name: String,
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_name: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            job_id: job_id.into(),
        }
    }
}

/// A job reported by the backend, with whatever tags it carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedJob {
    pub handle: JobHandle,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl TrackedJob {
    pub fn untagged(handle: JobHandle) -> Self {
        Self {
            handle,
            tags: BTreeMap::new(),
        }
    }

    pub fn correlation_tag(&self) -> Option<&str> {
        self.tags.get(CORRELATION_KEY_TAG).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Statuses a job can still leave; the filter used to list live work.
    pub const ACTIVE: [JobStatus; 5] = [
        JobStatus::Submitted,
        JobStatus::Pending,
        JobStatus::Runnable,
        JobStatus::Starting,
        JobStatus::Running,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Runnable => "RUNNABLE",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StatusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(Self::Submitted),
            "PENDING" => Ok(Self::Pending),
            "RUNNABLE" => Ok(Self::Runnable),
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            _ => Err(StatusError(raw.to_string())),
        }
    }
}

/// One `(job id, status)` pair from a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job_id: String,
    pub status: JobStatus,
}

impl StatusRecord {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOverride {
    pub vcpus: Option<u32>,
    pub memory_mib: Option<u32>,
}

impl ResourceOverride {
    pub fn is_empty(&self) -> bool {
        self.vcpus.is_none() && self.memory_mib.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_name: String,
    pub job_definition: String,
    pub job_queue: String,
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub resources: ResourceOverride,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl JobSubmission {
    pub fn new(
        job_name: impl Into<String>,
        job_definition: impl Into<String>,
        job_queue: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            job_definition: job_definition.into(),
            job_queue: job_queue.into(),
            command: None,
            resources: ResourceOverride::default(),
            tags: BTreeMap::new(),
        }
    }

    /// Overrides the container command. Batch only accepts string arguments,
    /// so every argument is stringified here.
    pub fn with_command<I, T>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.command = Some(command.into_iter().map(|arg| arg.to_string()).collect());
        self
    }

    pub fn with_resources(mut self, resources: ResourceOverride) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_correlation_key(mut self, key: CorrelationKey) -> Self {
        self.tags
            .insert(CORRELATION_KEY_TAG.to_string(), key.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ec2,
    Fargate,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ec2 => "EC2",
            Self::Fargate => "FARGATE",
        }
    }

    pub fn supports_gpu(self) -> bool {
        matches!(self, Self::Ec2)
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ec2" => Ok(Self::Ec2),
            "fargate" => Ok(Self::Fargate),
            _ => Err(ValidationError::new(format!(
                "Unsupported platform '{raw}' (expected ec2 or fargate)"
            ))),
        }
    }
}

/// Container job definition shared by every job of one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinitionSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub vcpus: u32,
    pub memory_mib: u32,
    #[serde(default)]
    pub gpus: u32,
    /// Attempt duration limit; zero disables it.
    #[serde(default)]
    pub timeout_secs: u32,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub role_arn: Option<String>,
    pub platform: Platform,
}

impl JobDefinitionSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("job definition name cannot be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(ValidationError::new("job definition image cannot be empty"));
        }
        if self.vcpus == 0 || self.memory_mib == 0 {
            return Err(ValidationError::new(
                "job definition needs a positive vcpu and memory requirement",
            ));
        }
        if self.role_arn.as_deref().map_or(true, |arn| arn.trim().is_empty()) {
            return Err(ValidationError::new(format!(
                "an IAM role with execution permission is required on {}",
                self.platform.as_str()
            )));
        }
        Ok(())
    }

    /// The role ARN in `:role/` form, whichever form the caller supplied.
    pub fn execution_role_arn(&self) -> Option<String> {
        self.role_arn
            .as_deref()
            .map(|arn| arn.replace(":instance-profile", ":role"))
    }

    /// GPU requirement to register, if the platform can honour it.
    pub fn gpu_requirement(&self) -> Option<u32> {
        (self.gpus > 0 && self.platform.supports_gpu()).then_some(self.gpus)
    }
}

pub fn contract_fingerprint(value: impl Serialize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(value));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
