use async_trait::async_trait;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Event, FilterRule, FilterRuleName,
    NotificationConfiguration, NotificationConfigurationFilter, PublicAccessBlockConfiguration,
    QueueConfiguration, S3KeyFilter,
};
use tracing::info;
use twinflow_core::inventory::ObjectEntry;

use super::{number, remote_error, text};
use crate::error::{tolerate_idempotent, Result, TwinflowError};

/// Buckets in this region must be created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

const NOTIFIED_EVENTS: [&str; 2] = ["s3:ObjectCreated:*", "s3:ObjectRemoved:*"];

/// Created and removed events for keys under `prefix`, delivered to `queue_arn`.
fn queue_notification(id: &str, queue_arn: &str, prefix: &str) -> Result<QueueConfiguration> {
    let filter = NotificationConfigurationFilter::builder()
        .key(
            S3KeyFilter::builder()
                .filter_rules(
                    FilterRule::builder()
                        .name(FilterRuleName::Prefix)
                        .value(prefix)
                        .build(),
                )
                .build(),
        )
        .build();

    QueueConfiguration::builder()
        .id(id)
        .queue_arn(queue_arn)
        .set_events(Some(NOTIFIED_EVENTS.iter().map(|event| Event::from(*event)).collect()))
        .filter(filter)
        .build()
        .map_err(|error| {
            TwinflowError::remote("PutBucketNotificationConfiguration", error.to_string())
        })
}

/// `added` first, then every existing configuration with a different id.
fn merge_queue_notifications(
    added: QueueConfiguration,
    existing: &[QueueConfiguration],
) -> Vec<QueueConfiguration> {
    let mut merged = vec![added.clone()];
    merged.extend(
        existing
            .iter()
            .filter(|configuration| configuration.id() != added.id())
            .cloned(),
    );
    merged
}

#[async_trait]
pub trait ObjectInventory: Send + Sync {
    /// Every object under `prefix`, placeholders included.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            client,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Creates the bucket with all public access blocked. An existing bucket
    /// owned by the caller counts as created.
    pub async fn create_bucket(&self, region: Option<&str>) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if let Some(region) = region.filter(|region| *region != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        let created = request
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("CreateBucket", error));
        tolerate_idempotent(created, &self.bucket)?;

        self.client
            .put_public_access_block()
            .bucket(&self.bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(true)
                    .restrict_public_buckets(true)
                    .build(),
            )
            .send()
            .await
            .map_err(|error| remote_error("PutPublicAccessBlock", error))?;

        info!(bucket = %self.bucket, "bucket ready");
        Ok(())
    }

    /// Sends created and removed events under `prefix` to `queue_arn`. The
    /// bucket's other notifications are kept; one with the same `id` is
    /// replaced.
    pub async fn add_queue_notification(
        &self,
        id: &str,
        queue_arn: &str,
        prefix: &str,
    ) -> Result<()> {
        let current = self
            .client
            .get_bucket_notification_configuration()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|error| remote_error("GetBucketNotificationConfiguration", error))?;

        let queues = merge_queue_notifications(
            queue_notification(id, queue_arn, prefix)?,
            current.queue_configurations(),
        );
        let configuration = NotificationConfiguration::builder()
            .set_queue_configurations(Some(queues))
            .set_topic_configurations(Some(current.topic_configurations().to_vec()))
            .set_lambda_function_configurations(Some(
                current.lambda_function_configurations().to_vec(),
            ))
            .set_event_bridge_configuration(current.event_bridge_configuration().cloned())
            .build();

        self.client
            .put_bucket_notification_configuration()
            .bucket(&self.bucket)
            .notification_configuration(configuration)
            .send()
            .await
            .map_err(|error| remote_error("PutBucketNotificationConfiguration", error))?;

        info!(bucket = %self.bucket, id, prefix, "queue notification added");
        Ok(())
    }

    pub async fn delete_bucket(&self, expected_owner: Option<&str>) -> Result<()> {
        let deleted = self
            .client
            .delete_bucket()
            .bucket(&self.bucket)
            .set_expected_bucket_owner(expected_owner.map(str::to_string))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("DeleteBucket", error));
        tolerate_idempotent(deleted, &self.bucket)
    }
}

#[async_trait]
impl ObjectInventory for S3ObjectStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut entries = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| remote_error("ListObjectsV2", error))?;
            for object in page.contents() {
                if let Some(key) = text(object.key()) {
                    entries.push(ObjectEntry::new(key, number::<i64>(object.size()).unwrap_or(0)));
                }
            }
        }
        Ok(entries)
    }
}
