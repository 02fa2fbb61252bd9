use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scheduled provisioning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its schedule_time to arrive.
    Pending,
    /// Claimed by exactly one scheduler; an attempt is in flight.
    Executing,
    /// The external API accepted the payload.
    Completed,
    /// Retries exhausted or the endpoint rejected the payload for good.
    Failed,
    /// Withdrawn before it was ever claimed.
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Executing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Executing => "executing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "executing" => Ok(JobStatus::Executing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Primary key, assigned on insert.
    pub id: Uuid,
    /// Forwarded verbatim to the provisioning endpoint; never inspected here.
    pub payload: serde_json::Value,
    /// The job becomes claimable once `now >= schedule_time`.
    pub schedule_time: DateTime<Utc>,
    pub status: JobStatus,
    /// Free-form labels for filtering ("new-hire", "contractor", ...).
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on entering `completed` or terminal `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    /// Detail of the most recent failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Failed attempts that were rescheduled.
    pub retry_count: u32,
}

/// Input for [`crate::store::JobStore::insert`]; identity, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub payload: serde_json::Value,
    pub schedule_time: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Filter for listing jobs, newest `schedule_time` first.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub tag: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// Classified result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Network error, timeout, or a non-2xx response; retry-eligible.
    TransientFailure(String),
    /// The endpoint said the payload will never be accepted.
    PermanentFailure(String),
}

impl Outcome {
    pub fn detail(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::TransientFailure(d) | Outcome::PermanentFailure(d) => Some(d),
        }
    }
}

/// Every field written when an attempt is settled. Persisted in a single
/// conditional update so no partial state is ever visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: JobStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// New eligibility time when the job is requeued; `None` keeps the old one.
    pub schedule_time: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}
