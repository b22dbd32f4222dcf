//! Error types for the task lifecycle.
//!
//! Every failure is scoped to a single user action: the store is left as it
//! was before the action and the caller may retry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fields::{SubmissionStatus, TaskStatus};
use crate::validation::FailedZone;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Which collection a lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Submission,
    User,
    Notification,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Task => "task",
            EntityKind::Submission => "submission",
            EntityKind::User => "user",
            EntityKind::Notification => "notification",
        })
    }
}

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input refused; every offending field is listed.
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Rejecting a submission needs feedback for the field user.
    #[error("feedback is required to reject a submission")]
    FeedbackRequired,

    /// The submission already left the review queue.
    #[error("submission {id} is {status}, not pending review")]
    StaleSubmission { id: String, status: SubmissionStatus },

    /// A queue decision was attempted with nothing selected.
    #[error("no submission selected")]
    NothingSelected,

    #[error("cannot {action} task {id} while it is {from}")]
    InvalidTransition { id: String, from: TaskStatus, action: &'static str },

    /// A task may only have one submission waiting for review.
    #[error("task {task_id} already has submission {submission_id} pending review")]
    LiveSubmissionExists { task_id: String, submission_id: String },

    /// The task is already completed; there is nothing left to submit.
    #[error("task {id} is {status} and accepts no further submissions")]
    NotActionable { id: String, status: TaskStatus },

    /// The validator was reached and reported that the photo does not meet the standard.
    #[error("visual standard not met: {reason}")]
    StandardNotMet { reason: String, zones: Vec<FailedZone> },

    /// The validator could not be reached or answered garbage. Retry later.
    #[error("visual standard validation unavailable: {0}")]
    ValidationUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Whether repeating the same action unchanged may succeed.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ValidationUnavailable(_) | Self::Io(_))
    }

    /// Field errors carried by a validation failure, if any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = Error::Validation(vec![
            FieldError::new("name", "is required"),
            FieldError::new("due_date", "is required"),
        ]);
        assert_eq!(err.to_string(), "validation failed: name: is required; due_date: is required");
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_retryable_split() {
        assert!(Error::ValidationUnavailable("timeout".into()).is_retryable());
        assert!(!Error::StandardNotMet { reason: "x".into(), zones: vec![] }.is_retryable());
        assert!(!Error::FeedbackRequired.is_retryable());
    }
}
