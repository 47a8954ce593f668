//! Error types for the upload core.
//!
//! Per-job publish failures are recorded on the job and do not stop a run.
//! Everything else is surfaced to the caller immediately.

use std::path::PathBuf;
use thiserror::Error;

use crate::path_key::PathKey;

/// Errors raised by queue mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The path is already queued. Informational, the queue is unchanged.
    #[error("already queued: {path}")]
    DuplicateIgnored { path: PathKey },

    /// The operation needs at least one job.
    #[error("the queue is empty")]
    EmptyQueue,

    /// Bulk description input was rejected.
    #[error("invalid description template: {reason}")]
    InvalidTemplate { reason: String },

    /// Membership and descriptions are frozen while a run is active.
    #[error("the queue is locked while an upload run is active")]
    QueueLocked,
}

impl QueueError {
    /// Whether this is a report rather than a failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::DuplicateIgnored { .. })
    }

    pub fn invalid_template(reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            reason: reason.into(),
        }
    }
}

/// Reasons a run refuses to start. No state is changed when these occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no videos to upload")]
    EmptyQueue,

    #[error("no session cookie file configured")]
    MissingCredential,

    #[error("an upload run is already active")]
    RunAlreadyActive,
}

/// Credential loading failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The cookie file does not exist or cannot be read.
    #[error("cookie file not found or unreadable: {}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The file was readable but held no cookies.
    #[error("no cookies found in {}", path.display())]
    Empty { path: PathBuf },
}

/// Outcome of a failed publish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The platform rejected this job. The run continues.
    #[error("{message}")]
    Rejected { message: String },

    /// The publisher itself is unusable. The run stops.
    #[error("{message}")]
    Fatal { message: String },
}

impl PublishError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message } | Self::Fatal { message } => message,
        }
    }
}

/// Media discovery failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to read directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_informational_only() {
        let dup = QueueError::DuplicateIgnored {
            path: PathKey::new("/videos/a.mp4"),
        };
        assert!(dup.is_informational());
        assert!(!QueueError::QueueLocked.is_informational());
        assert!(!QueueError::EmptyQueue.is_informational());
    }

    #[test]
    fn publish_error_keeps_the_raw_message() {
        let e = PublishError::rejected("rate limited");
        assert_eq!(e.to_string(), "rate limited");
        assert_eq!(e.message(), "rate limited");
        assert!(!e.is_fatal());
        assert!(PublishError::fatal("session expired").is_fatal());
    }
}
