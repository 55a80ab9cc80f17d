use thiserror::Error;

/// A name that does not follow the documented correlation-key convention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("item name '{name}' does not match '<prefix>_<key>.<ext>'")]
    MalformedItemName { name: String },
    #[error("job name '{name}' does not match '{prefix}-<key>'")]
    MalformedJobName { name: String, prefix: String },
    #[error("correlation key '{raw}' in '{name}' is not an unsigned integer")]
    NonNumericKey { name: String, raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status '{0}'")]
pub struct StatusError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
