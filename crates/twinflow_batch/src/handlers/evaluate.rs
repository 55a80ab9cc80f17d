use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use twinflow_core::contract::{CorrelationKey, JobHandle, JobSubmission};
use twinflow_core::error::ValidationError;

use crate::adapters::batch::JobBackend;
use crate::config::EvaluateConfig;
use crate::error::Result;
use crate::handlers::active_jobs::submit_job;
use crate::handlers::poller::{wait_for_jobs, PollSettings, WaitOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_uid: String,
    pub submitted: Vec<JobHandle>,
    pub outcome: WaitOutcome,
}

/// Formats one input row the way the worker script parses it.
fn join_row(row: &[f64]) -> String {
    row.iter()
        .map(|value| format!("{value:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn evaluation_submissions(
    rows: &[Vec<f64>],
    config: &EvaluateConfig,
) -> Result<Vec<JobSubmission>> {
    if rows.is_empty() {
        return Err(ValidationError::new("evaluation needs at least one input row").into());
    }
    if let Some(index) = rows.iter().position(|row| row.is_empty()) {
        return Err(ValidationError::new(format!("input row {index} is empty")).into());
    }

    Ok(rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            JobSubmission::new(
                format!("{}-{index}", config.job_definition),
                &config.job_definition,
                &config.job_queue,
            )
            .with_command([
                config.python.clone(),
                config.worker_script.clone(),
                "-x".to_string(),
                join_row(row),
                "-t".to_string(),
                config.results_table.clone(),
                "-i".to_string(),
                config.run_uid.clone(),
                "-c".to_string(),
                config.config_filename.clone(),
            ])
            .with_correlation_key(CorrelationKey(index as u64))
        })
        .collect())
}

/// Submits one job per row and waits for exactly those jobs.
pub async fn run_evaluation(
    backend: &dyn JobBackend,
    rows: &[Vec<f64>],
    config: &EvaluateConfig,
    poll: &PollSettings,
    cancel: &CancellationToken,
) -> Result<EvaluationReport> {
    let submissions = evaluation_submissions(rows, config)?;

    let mut submitted = Vec::with_capacity(submissions.len());
    for submission in &submissions {
        submitted.push(submit_job(backend, submission, &poll.retry).await?);
    }
    info!(run_uid = %config.run_uid, jobs = submitted.len(), "evaluation submitted");

    let outcome = wait_for_jobs(
        backend,
        submitted.iter().map(|handle| handle.job_id.clone()),
        poll,
        cancel,
    )
    .await?;

    Ok(EvaluationReport {
        run_uid: config.run_uid.clone(),
        submitted,
        outcome,
    })
}
