//! Traits at the AWS boundary and their SDK-backed implementations.

pub mod batch;
pub mod object_store;
pub mod queue;

use crate::error::TwinflowError;

/// Formats an SDK failure with its full source chain so rate-limit and
/// already-exists markers survive into the message.
pub(crate) fn remote_error<E>(operation: &str, error: E) -> TwinflowError
where
    E: std::error::Error + Send + Sync + 'static,
{
    TwinflowError::remote(
        operation,
        aws_sdk_batch::error::DisplayErrorContext(&error).to_string(),
    )
}

// SDK shapes differ in whether a member is modelled as required; these accept
// either accessor form.
pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> Option<&'a str> {
    value.into()
}

pub(crate) fn number<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

pub(crate) fn present<'a, T>(value: impl Into<Option<&'a T>>) -> Option<&'a T> {
    value.into()
}
