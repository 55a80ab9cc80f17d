use thiserror::Error;
use tracing::info;
use twinflow_core::error::{NamingError, StatusError, ValidationError};
use twinflow_core::retry::ErrorClass;

#[derive(Debug, Error)]
pub enum TwinflowError {
    #[error("{operation} failed: {message}")]
    Remote { operation: String, message: String },
    #[error("{operation} still throttled after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = TwinflowError> = std::result::Result<T, E>;

impl TwinflowError {
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Retry classification; only remote failures can be throttled or
    /// idempotent.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Remote { message, .. } => ErrorClass::of(message),
            _ => ErrorClass::Fatal,
        }
    }
}

/// Treats "already exists" on create and "already gone" on delete as success.
pub fn tolerate_idempotent(result: Result<()>, resource: &str) -> Result<()> {
    match result {
        Err(error) if error.class().is_success_equivalent() => {
            info!(resource, outcome = ?error.class(), "nothing to do: {error}");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_remote_errors_are_classified_from_message() {
        let throttled = TwinflowError::remote("SubmitJob", "Too Many Requests");
        assert_eq!(throttled.class(), ErrorClass::Throttled);

        let config = TwinflowError::Config("Too Many Requests".to_string());
        assert_eq!(config.class(), ErrorClass::Fatal);
    }

    #[test]
    fn idempotent_outcomes_become_success() {
        let exists = Err(TwinflowError::remote(
            "CreateBucket",
            "BucketAlreadyOwnedByYou: Your previous request to create the named bucket succeeded",
        ));
        assert!(tolerate_idempotent(exists, "twinflow-data").is_ok());

        let gone = Err(TwinflowError::remote(
            "DeleteQueue",
            "AWS.SimpleQueueService.NonExistentQueue",
        ));
        assert!(tolerate_idempotent(gone, "twinflow-events").is_ok());

        let denied = Err(TwinflowError::remote("DeleteBucket", "AccessDenied"));
        assert!(tolerate_idempotent(denied, "twinflow-data").is_err());
    }
}
