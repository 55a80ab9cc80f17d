//! Environment and file based configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use twinflow_core::contract::{JobDefinitionSpec, Platform, ResourceOverride};
use twinflow_core::retry::RetryPolicy;

use crate::error::{Result, TwinflowError};
use crate::handlers::autoscale::{
    sensor_command, AutoscaleSettings, DEFAULT_ITEM_PREFIX, DEFAULT_JOB_DEFINITION,
    DEFAULT_JOB_PREFIX, DEFAULT_SENSOR_COMMAND,
};

const DEFAULT_CPU: u32 = 2;
const DEFAULT_MEMORY_MIB: u32 = 2048;
const DEFAULT_SUBMIT_CONCURRENCY: usize = 8;
/// Stands in for the object key in the registered definition's command;
/// every submission overrides it.
const DEFINITION_OBJECT_KEY: &str = "somefile.csv";

/// Settings for the reconcile Lambda, read from `TWINFLOW_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub autoscale: AutoscaleSettings,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| TwinflowError::Config(format!("{name} must be configured")))
        };
        let or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let job_queue = required("TWINFLOW_JOB_QUEUE")?;
        let bucket = required("TWINFLOW_BUCKET")?;
        let platform: Platform = or_default("TWINFLOW_PLATFORM", "ec2").parse()?;
        let ansys_server = or_default("TWINFLOW_ANSYS_SERVER", "");
        let command_template: Vec<String> =
            DEFAULT_SENSOR_COMMAND.iter().map(|arg| arg.to_string()).collect();

        let job_definition = JobDefinitionSpec {
            name: or_default("TWINFLOW_JOB_DEFINITION", DEFAULT_JOB_DEFINITION),
            image: required("TWINFLOW_SENSOR_IMAGE")?,
            command: sensor_command(
                &command_template,
                DEFINITION_OBJECT_KEY,
                &bucket,
                &ansys_server,
            ),
            vcpus: parse_number(&lookup, "TWINFLOW_CPU", DEFAULT_CPU)?,
            memory_mib: parse_number(&lookup, "TWINFLOW_MEMORY_MIB", DEFAULT_MEMORY_MIB)?,
            gpus: parse_number(&lookup, "TWINFLOW_GPU", 0)?,
            timeout_secs: parse_number(&lookup, "TWINFLOW_TIMEOUT_SECS", 0)?,
            environment: Default::default(),
            role_arn: Some(required("TWINFLOW_ROLE_ARN")?),
            platform,
        };

        Ok(Self {
            autoscale: AutoscaleSettings {
                job_queue,
                bucket,
                item_prefix: or_default("TWINFLOW_ITEM_PREFIX", DEFAULT_ITEM_PREFIX),
                job_prefix: or_default("TWINFLOW_JOB_PREFIX", DEFAULT_JOB_PREFIX),
                job_definition,
                command_template,
                ansys_server,
                resources: ResourceOverride::default(),
                submit_concurrency: parse_number(
                    &lookup,
                    "TWINFLOW_SUBMIT_CONCURRENCY",
                    DEFAULT_SUBMIT_CONCURRENCY,
                )?,
                retry: RetryPolicy::default(),
            },
        })
    }
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TwinflowError::Config(format!("{name} must be a number, got {raw:?}"))),
    }
}

fn default_python() -> String {
    "python3.10".to_string()
}

/// Evaluation fan-out settings loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub worker_script: String,
    pub results_table: String,
    pub run_uid: String,
    pub job_definition: String,
    pub job_queue: String,
    #[serde(default = "default_python")]
    pub python: String,
    /// Path the config was read from; workers are pointed back at it.
    #[serde(skip)]
    pub config_filename: String,
}

impl EvaluateConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.config_filename = path.display().to_string();
        Ok(config)
    }
}
