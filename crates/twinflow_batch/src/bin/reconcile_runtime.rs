use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tracing::info;
use twinflow_batch::adapters::batch::AwsBatchBackend;
use twinflow_batch::adapters::object_store::S3ObjectStore;
use twinflow_batch::config::RuntimeConfig;
use twinflow_batch::handlers::autoscale::run_autoscale;
use twinflow_batch::telemetry::{self, LogFormat};

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let config = RuntimeConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let trigger = describe_trigger(&event.payload);
    info!(
        request_id = %event.context.request_id,
        trigger,
        queue = %config.autoscale.job_queue,
        "reconciliation triggered"
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let backend = AwsBatchBackend::new(aws_sdk_batch::Client::new(&aws_config));
    let inventory = S3ObjectStore::new(
        aws_sdk_s3::Client::new(&aws_config),
        config.autoscale.bucket.clone(),
    );

    let report = run_autoscale(&backend, &inventory, &config.autoscale)
        .await
        .map_err(|error| Error::from(error.to_string()))?;
    info!(
        killed = report.killed.len(),
        submitted = report.submitted.len(),
        unchanged = report.unchanged,
        fingerprint = %report.snapshot_fingerprint,
        "reconciliation finished"
    );

    Ok(json!({
        "status": "ok",
        "trigger": trigger,
        "report": serde_json::to_value(&report)
            .map_err(|error| Error::from(format!("failed to serialize report: {error}")))?,
    }))
}

/// Every invocation reconciles; the event source only shows up in logs.
fn describe_trigger(event: &Value) -> &'static str {
    if is_sqs_event(event) {
        "sqs"
    } else if event.get("source").and_then(Value::as_str) == Some("aws.events") {
        "schedule"
    } else {
        "direct"
    }
}

fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init("info", LogFormat::from_env());
    lambda_runtime::run(service_fn(handle_request)).await
}
