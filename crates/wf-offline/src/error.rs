//! Error types for offline conversion

use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Offline conversion errors
#[derive(Error, Debug)]
pub enum OfflineError {
    /// Submission-time rejection (size or type). Never creates a job.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    /// A conversion stage panicked; the job is failed and the run continues
    #[error("Conversion panicked: {0}")]
    Panicked(String),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Job {id} is {status:?}; cannot {action}")]
    InvalidTransition {
        id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Invalid trim range {start}..{end}: {reason}")]
    InvalidTrim {
        start: f64,
        end: f64,
        reason: &'static str,
    },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("A batch run is already in progress")]
    AlreadyRunning,

    #[error("Core error: {0}")]
    Core(#[from] wf_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OfflineError {
    /// Cooperative cancellation, handled at the runner's top-level loop
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors that fail a single job without aborting the batch
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Render(_) | Self::Encode(_) | Self::Panicked(_)
        )
    }
}

/// Result type for offline operations
pub type OfflineResult<T> = Result<T, OfflineError>;
