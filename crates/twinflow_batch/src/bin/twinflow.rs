use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use twinflow_batch::adapters::batch::AwsBatchBackend;
use twinflow_batch::adapters::object_store::{ObjectInventory, S3ObjectStore};
use twinflow_batch::adapters::queue::{create_notification_queue, delete_queues, SqsQueue};
use twinflow_batch::config::{EvaluateConfig, RuntimeConfig};
use twinflow_batch::handlers::active_jobs::{kill_jobs, list_active_jobs};
use twinflow_batch::handlers::autoscale::run_autoscale;
use twinflow_batch::handlers::evaluate::run_evaluation;
use twinflow_batch::handlers::job_definition::{define_job, remove_job_definition};
use twinflow_batch::handlers::poller::{wait_for_jobs, PollSettings, WaitOutcome};
use twinflow_batch::handlers::queue_watch::{watch_queue, WatchOutcome, WatchSettings};
use twinflow_batch::telemetry::{self, LogFormat};
use twinflow_core::contract::{JobDefinitionSpec, Platform, DEFAULT_KILL_REASON};
use twinflow_core::inventory::{retain_payload_objects, work_items};
use twinflow_core::retry::RetryPolicy;

#[derive(Parser)]
#[command(
    name = "twinflow",
    about = "Operate twinflow workloads on AWS Batch",
    long_about = "Inspect and kill queued jobs, reconcile sensor jobs against the\n\
                  object store, fan out evaluations, and manage the supporting\n\
                  buckets, queues and job definitions."
)]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs that have not finished yet
    Status {
        #[arg(long, env = "TWINFLOW_JOB_QUEUE")]
        queue: String,
    },
    /// Kill every unfinished job in the queue
    Kill {
        #[arg(long, env = "TWINFLOW_JOB_QUEUE")]
        queue: String,
        #[arg(long, default_value = DEFAULT_KILL_REASON)]
        reason: String,
    },
    /// Run one reconciliation pass using TWINFLOW_* settings
    Reconcile,
    /// Wait for jobs to reach a terminal status
    Wait {
        /// Job ids to wait for
        #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long, default_value_t = 1)]
        interval_secs: u64,
    },
    /// Block until a message arrives on the queue
    WatchQueue {
        #[arg(long, env = "TWINFLOW_QUEUE_URL")]
        url: String,
        #[arg(long, default_value_t = 20)]
        wait_secs: u32,
        /// Purge the queue instead of deleting the received messages
        #[arg(long)]
        purge: bool,
    },
    /// Submit one job per input row and wait for them
    Evaluate {
        /// JSON evaluation config
        #[arg(long)]
        config: PathBuf,
        /// JSON array of numeric rows
        #[arg(long)]
        inputs: PathBuf,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List work-item objects and their correlation keys
    Inventory {
        #[arg(long, env = "TWINFLOW_BUCKET")]
        bucket: String,
        #[arg(long, env = "TWINFLOW_ITEM_PREFIX", default_value = "")]
        prefix: String,
    },
    /// Create a bucket with public access blocked
    CreateBucket {
        #[arg(long, env = "TWINFLOW_BUCKET")]
        bucket: String,
    },
    /// Delete an empty bucket
    DeleteBucket {
        #[arg(long, env = "TWINFLOW_BUCKET")]
        bucket: String,
        #[arg(long)]
        expected_owner: Option<String>,
    },
    /// Create a queue the bucket may send object events to
    CreateQueue {
        #[arg(long)]
        name: String,
        /// Account that owns the bucket
        #[arg(long)]
        account_id: String,
        #[arg(long, env = "TWINFLOW_BUCKET")]
        bucket: String,
    },
    /// Send created and removed events under a prefix to a queue
    Notify {
        #[arg(long, env = "TWINFLOW_BUCKET")]
        bucket: String,
        #[arg(long)]
        queue_arn: String,
        #[arg(long, env = "TWINFLOW_ITEM_PREFIX")]
        prefix: String,
        /// Notification id; an existing one with this id is replaced
        #[arg(long, default_value = "twinflow-reconcile")]
        id: String,
    },
    /// Delete every queue whose name starts with the prefix
    DeleteQueues {
        #[arg(long)]
        prefix: String,
    },
    /// Register a container job definition
    DefineJob {
        #[arg(long)]
        name: String,
        #[arg(long)]
        image: String,
        #[arg(long, default_value_t = 2)]
        vcpus: u32,
        #[arg(long, default_value_t = 2048)]
        memory_mib: u32,
        #[arg(long, default_value_t = 0)]
        gpus: u32,
        #[arg(long, default_value_t = 0)]
        timeout_secs: u32,
        #[arg(long, env = "TWINFLOW_ROLE_ARN")]
        role_arn: String,
        /// ec2 or fargate
        #[arg(long, default_value = "ec2")]
        platform: String,
        /// Container command
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Deregister every active revision of a job definition
    RemoveJobDefinition {
        #[arg(long)]
        name: String,
    },
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn poll_settings(timeout_secs: Option<u64>) -> PollSettings {
    PollSettings {
        max_wait: timeout_secs.map(Duration::from_secs),
        ..PollSettings::default()
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level, LogFormat::from_env());

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let batch = || AwsBatchBackend::new(aws_sdk_batch::Client::new(&aws_config));
    let retry = RetryPolicy::default();

    match cli.command {
        Commands::Status { queue } => {
            let jobs = list_active_jobs(&batch(), &queue, &retry).await?;
            if jobs.is_empty() {
                println!("No jobs in queue.");
            }
            for job in jobs {
                println!("{}\t{}", job.handle.job_name, job.handle.job_id);
            }
        }
        Commands::Kill { queue, reason } => {
            let backend = batch();
            let ids: Vec<String> = list_active_jobs(&backend, &queue, &retry)
                .await?
                .into_iter()
                .map(|job| job.handle.job_id)
                .collect();
            if ids.is_empty() {
                println!("No jobs in queue.");
            } else {
                let killed = kill_jobs(&backend, &ids, &reason, &retry).await?;
                println!("Killed: {}", killed.join(", "));
            }
        }
        Commands::Reconcile => {
            let config = RuntimeConfig::from_env()?;
            let inventory = S3ObjectStore::new(
                aws_sdk_s3::Client::new(&aws_config),
                config.autoscale.bucket.clone(),
            );
            let report = run_autoscale(&batch(), &inventory, &config.autoscale).await?;
            print_json(&report)?;
        }
        Commands::Wait {
            ids,
            timeout_secs,
            interval_secs,
        } => {
            let settings = PollSettings {
                interval: Duration::from_secs(interval_secs),
                ..poll_settings(timeout_secs)
            };
            let outcome = wait_for_jobs(&batch(), ids, &settings, &cancel_on_ctrl_c()).await?;
            print_json(&outcome)?;
            if !outcome.is_completed() {
                std::process::exit(2);
            }
        }
        Commands::WatchQueue {
            url,
            wait_secs,
            purge,
        } => {
            let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&aws_config), url);
            let settings = WatchSettings { wait_secs, purge };
            match watch_queue(&queue, &settings, &cancel_on_ctrl_c()).await? {
                WatchOutcome::Received(handles) => print_json(&handles)?,
                WatchOutcome::Cancelled => bail!("watch cancelled before a message arrived"),
            }
        }
        Commands::Evaluate {
            config,
            inputs,
            timeout_secs,
        } => {
            let config = EvaluateConfig::from_json_file(&config)?;
            let raw = std::fs::read_to_string(&inputs)
                .with_context(|| format!("failed to read {}", inputs.display()))?;
            let rows: Vec<Vec<f64>> = serde_json::from_str(&raw)
                .with_context(|| format!("{} must hold an array of numeric rows", inputs.display()))?;
            let report = run_evaluation(
                &batch(),
                &rows,
                &config,
                &poll_settings(timeout_secs),
                &cancel_on_ctrl_c(),
            )
            .await?;
            print_json(&report)?;
            if let WaitOutcome::TimedOut { .. } | WaitOutcome::Cancelled { .. } = report.outcome {
                std::process::exit(2);
            }
        }
        Commands::Inventory { bucket, prefix } => {
            let store = S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config), bucket);
            let objects = retain_payload_objects(store.list_objects(&prefix).await?);
            for item in work_items(&objects)? {
                println!("{}\t{}", item.key, item.object_key);
            }
        }
        Commands::CreateBucket { bucket } => {
            let region = aws_config.region().map(|region| region.to_string());
            let store = S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config), bucket);
            store.create_bucket(region.as_deref()).await?;
            println!("Bucket ready: {}", store.bucket());
        }
        Commands::DeleteBucket {
            bucket,
            expected_owner,
        } => {
            let store = S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config), bucket);
            store.delete_bucket(expected_owner.as_deref()).await?;
            println!("Bucket removed: {}", store.bucket());
        }
        Commands::CreateQueue {
            name,
            account_id,
            bucket,
        } => {
            let client = aws_sdk_sqs::Client::new(&aws_config);
            let queue = create_notification_queue(&client, &name, &account_id, &bucket).await?;
            print_json(&queue)?;
        }
        Commands::Notify {
            bucket,
            queue_arn,
            prefix,
            id,
        } => {
            let store = S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config), bucket);
            store.add_queue_notification(&id, &queue_arn, &prefix).await?;
            println!("Notifying {queue_arn} of changes under {prefix:?} in {}", store.bucket());
        }
        Commands::DeleteQueues { prefix } => {
            let deleted = delete_queues(&aws_sdk_sqs::Client::new(&aws_config), &prefix).await?;
            println!("Deleted {deleted} queue(s) matching {prefix:?}");
        }
        Commands::DefineJob {
            name,
            image,
            vcpus,
            memory_mib,
            gpus,
            timeout_secs,
            role_arn,
            platform,
            command,
        } => {
            let platform: Platform = platform.parse()?;
            let spec = JobDefinitionSpec {
                name,
                image,
                command,
                vcpus,
                memory_mib,
                gpus,
                timeout_secs,
                environment: Default::default(),
                role_arn: Some(role_arn),
                platform,
            };
            let arn = define_job(&batch(), &spec, &retry).await?;
            println!("{arn}");
        }
        Commands::RemoveJobDefinition { name } => {
            let removed = remove_job_definition(&batch(), &name, &retry).await?;
            println!("Deregistered {removed} revision(s) of {name}");
        }
    }

    Ok(())
}
