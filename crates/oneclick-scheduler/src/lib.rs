//! `oneclick-scheduler`: deferred provisioning jobs with SQLite persistence.
//!
//! # Overview
//!
//! Jobs sit in a SQLite `jobs` table until their `schedule_time` arrives. On
//! every tick the [`engine::Scheduler`] claims due jobs with a conditional
//! update, runs each on a bounded [`pool::WorkerPool`] through an
//! [`executor::Executor`], and records the outcome via the
//! [`retry::RetryPolicy`].
//!
//! # Job lifecycle
//!
//! | Status      | Meaning                                          |
//! |-------------|--------------------------------------------------|
//! | `pending`   | Waiting for `schedule_time`, or for a retry      |
//! | `executing` | Claimed; exactly one attempt in flight           |
//! | `completed` | The provisioning endpoint answered 2xx           |
//! | `failed`    | Retries exhausted, or rejected permanently       |
//! | `cancelled` | Withdrawn while still pending                    |
//!
//! Several scheduler processes may share one database file: the claim is the
//! only point of mutual exclusion.

pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pool;
pub mod retry;
pub mod status;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Scheduler, SchedulerOptions, TickReport};
pub use error::{Result, SchedulerError};
pub use executor::{Executor, HttpExecutor};
pub use pool::{PoolStats, WorkerPool};
pub use retry::RetryPolicy;
pub use store::{JobStore, SqliteStore};
pub use types::{Job, JobStatus, ListFilter, NewJob, Outcome, Resolution};
