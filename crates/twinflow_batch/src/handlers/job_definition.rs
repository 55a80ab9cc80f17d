use tracing::info;
use twinflow_core::contract::JobDefinitionSpec;
use twinflow_core::retry::RetryPolicy;

use crate::adapters::batch::JobBackend;
use crate::error::Result;
use crate::retry::with_backoff;

/// Validates and registers a new revision of the definition; returns its ARN.
pub async fn define_job(
    backend: &dyn JobBackend,
    spec: &JobDefinitionSpec,
    retry: &RetryPolicy,
) -> Result<String> {
    spec.validate()?;
    let arn = with_backoff(retry, "RegisterJobDefinition", || {
        backend.register_job_definition(spec)
    })
    .await?;
    info!(
        name = %spec.name,
        platform = spec.platform.as_str(),
        arn = %arn,
        "job definition registered"
    );
    Ok(arn)
}

/// Deregisters active revisions of `name` until none are reported; returns
/// the number of revisions removed.
pub async fn remove_job_definition(
    backend: &dyn JobBackend,
    name: &str,
    retry: &RetryPolicy,
) -> Result<usize> {
    let mut removed = 0;
    loop {
        let revisions = with_backoff(retry, "DescribeJobDefinitions", || {
            backend.active_job_definitions(name)
        })
        .await?;
        if revisions.is_empty() {
            break;
        }
        for reference in &revisions {
            with_backoff(retry, "DeregisterJobDefinition", || {
                backend.deregister_job_definition(reference)
            })
            .await?;
            info!(revision = %reference, "job definition deregistered");
            removed += 1;
        }
    }
    Ok(removed)
}
