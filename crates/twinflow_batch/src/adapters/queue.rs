use async_trait::async_trait;
use aws_sdk_sqs::types::QueueAttributeName;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{remote_error, text};
use crate::error::{tolerate_idempotent, Result, TwinflowError};

/// Receive batch size; the SQS maximum.
const MAX_MESSAGES_PER_RECEIVE: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub receipt_handle: String,
    pub body: Option<String>,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// One long-poll receive; returns as soon as messages arrive or after
    /// `wait_secs`.
    async fn receive(&self, wait_secs: u32) -> Result<Vec<QueueMessage>>;

    async fn delete(&self, receipt_handle: &str) -> Result<()>;

    async fn purge(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self, wait_secs: u32) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .wait_time_seconds(i32::try_from(wait_secs).unwrap_or(i32::MAX))
            .max_number_of_messages(MAX_MESSAGES_PER_RECEIVE)
            .send()
            .await
            .map_err(|error| remote_error("ReceiveMessage", error))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|message| {
                Some(QueueMessage {
                    receipt_handle: text(message.receipt_handle())?.to_string(),
                    body: text(message.body()).map(str::to_string),
                })
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("DeleteMessage", error))
    }

    async fn purge(&self) -> Result<()> {
        self.client
            .purge_queue()
            .queue_url(&self.queue_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("PurgeQueue", error))
    }
}

/// A queue that accepts object-store event notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationQueue {
    pub queue_url: String,
    pub queue_arn: String,
}

/// Access policy letting the object store of `account_id` send events from
/// `bucket` to the queue.
pub fn s3_send_policy(queue_arn: &str, bucket: &str, account_id: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Id": "twinflow-s3-events",
        "Statement": [{
            "Sid": "s3-events",
            "Effect": "Allow",
            "Principal": { "Service": "s3.amazonaws.com" },
            "Action": ["SQS:SendMessage"],
            "Resource": queue_arn,
            "Condition": {
                "ArnLike": { "aws:SourceArn": format!("arn:aws:s3:*:*:{bucket}") },
                "StringEquals": { "aws:SourceAccount": account_id }
            }
        }]
    })
    .to_string()
}

/// Creates `queue_name` (or reuses it when it already exists with the same
/// attributes) and attaches the policy that lets `bucket` publish to it.
pub async fn create_notification_queue(
    client: &aws_sdk_sqs::Client,
    queue_name: &str,
    account_id: &str,
    bucket: &str,
) -> Result<NotificationQueue> {
    let created = client
        .create_queue()
        .queue_name(queue_name)
        .send()
        .await
        .map_err(|error| remote_error("CreateQueue", error))?;
    let queue_url = text(created.queue_url())
        .ok_or_else(|| TwinflowError::remote("CreateQueue", "response did not include a queue url"))?
        .to_string();

    let attributes = client
        .get_queue_attributes()
        .queue_url(&queue_url)
        .attribute_names(QueueAttributeName::QueueArn)
        .send()
        .await
        .map_err(|error| remote_error("GetQueueAttributes", error))?;
    let queue_arn = attributes
        .attributes()
        .and_then(|attributes| attributes.get(&QueueAttributeName::QueueArn))
        .cloned()
        .ok_or_else(|| {
            TwinflowError::remote("GetQueueAttributes", "response did not include the queue arn")
        })?;

    client
        .set_queue_attributes()
        .queue_url(&queue_url)
        .attributes(
            QueueAttributeName::Policy,
            s3_send_policy(&queue_arn, bucket, account_id),
        )
        .send()
        .await
        .map_err(|error| remote_error("SetQueueAttributes", error))?;

    info!(queue_url = %queue_url, bucket, "notification queue ready");
    Ok(NotificationQueue {
        queue_url,
        queue_arn,
    })
}

/// Deletes every queue whose name starts with `name_prefix` and returns how
/// many delete requests were accepted. Queues that vanish in between are not
/// an error.
pub async fn delete_queues(client: &aws_sdk_sqs::Client, name_prefix: &str) -> Result<usize> {
    let mut pages = client
        .list_queues()
        .queue_name_prefix(name_prefix)
        .into_paginator()
        .send();

    let mut queue_urls = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page.map_err(|error| remote_error("ListQueues", error))?;
        queue_urls.extend(page.queue_urls().iter().cloned());
    }

    for queue_url in &queue_urls {
        let deleted = client
            .delete_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| remote_error("DeleteQueue", error));
        tolerate_idempotent(deleted, queue_url)?;
        info!(queue_url = %queue_url, "queue deleted");
    }
    Ok(queue_urls.len())
}
