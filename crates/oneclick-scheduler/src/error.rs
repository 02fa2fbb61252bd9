use thiserror::Error;
use uuid::Uuid;

use crate::types::JobStatus;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed or incomplete input, rejected before anything is persisted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested transition is not an edge of the job state machine.
    #[error("Job {id} cannot move from {from} to {to}")]
    Conflict {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: Uuid },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The worker pool has been shut down and accepts no more work.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// Every worker is busy and the queue is at its ceiling.
    #[error("Worker backlog is full")]
    Saturated,
}

impl SchedulerError {
    /// Short error code string returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Validation(_) => "VALIDATION_ERROR",
            SchedulerError::Conflict { .. } => "CONFLICT",
            SchedulerError::JobNotFound { .. } => "NOT_FOUND",
            SchedulerError::Database(_) => "PERSISTENCE_ERROR",
            SchedulerError::Corrupt(_) => "PERSISTENCE_ERROR",
            SchedulerError::Serialization(_) => "SERIALIZATION_ERROR",
            SchedulerError::HttpClient(_) => "CLIENT_ERROR",
            SchedulerError::ShuttingDown => "SHUTTING_DOWN",
            SchedulerError::Saturated => "SATURATED",
        }
    }

    /// Persistence failures leave the job at its last committed status; the
    /// next tick reconsiders it.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_) | SchedulerError::Corrupt(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
