use chrono::{DateTime, Duration, Utc};
use oneclick_core::config::{RetryTiming, SchedulerConfig};

use crate::types::{Job, JobStatus, Outcome, Resolution};

/// Decides what a finished attempt does to its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts that may be rescheduled before the job fails for good.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timing: RetryTiming,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            timing: RetryTiming::Delayed,
        }
    }

    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            retry_delay: Duration::from_std(cfg.retry_delay()).unwrap_or(Duration::MAX),
            timing: cfg.retry_timing,
        }
    }

    pub fn with_timing(mut self, timing: RetryTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Map an attempt's outcome onto the job's next persisted state.
    ///
    /// `job` is the record as claimed, so `job.retry_count` counts the
    /// failures before this attempt.
    pub fn resolve(&self, job: &Job, outcome: &Outcome, now: DateTime<Utc>) -> Resolution {
        match outcome {
            Outcome::Success => Resolution {
                status: JobStatus::Completed,
                retry_count: job.retry_count,
                error_message: None,
                schedule_time: None,
                executed_at: Some(now),
            },
            Outcome::PermanentFailure(detail) => self.fail(job, detail, now),
            Outcome::TransientFailure(detail) if job.retry_count < self.max_retries => {
                let schedule_time = match self.timing {
                    RetryTiming::Delayed => Some(now + self.retry_delay),
                    RetryTiming::Immediate => None,
                };
                Resolution {
                    status: JobStatus::Pending,
                    retry_count: job.retry_count + 1,
                    error_message: Some(detail.clone()),
                    schedule_time,
                    executed_at: None,
                }
            }
            Outcome::TransientFailure(detail) => self.fail(job, detail, now),
        }
    }

    fn fail(&self, job: &Job, detail: &str, now: DateTime<Utc>) -> Resolution {
        Resolution {
            status: JobStatus::Failed,
            retry_count: job.retry_count,
            error_message: Some(detail.to_string()),
            schedule_time: None,
            executed_at: Some(now),
        }
    }
}
