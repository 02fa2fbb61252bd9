use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Value, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::{configure, init_db},
    error::{Result, SchedulerError},
    status::transition,
    types::{Job, JobStatus, ListFilter, NewJob, Resolution},
};

/// Persistence seam for job records.
///
/// Every state change is a conditional write keyed on the current status, so
/// the store alone decides which caller wins a race. Implementations must not
/// split one logical update into several writes.
pub trait JobStore: Send + Sync {
    /// Create a `pending` job with a fresh ID and timestamps.
    fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job>;

    fn get_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// Jobs matching `filter`, newest `schedule_time` first.
    fn list(&self, filter: &ListFilter) -> Result<Vec<Job>>;

    /// Claim up to `limit` due jobs, earliest `schedule_time` first.
    ///
    /// Jobs another claimer took in the meantime are silently left out.
    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>>;

    /// Claim one specific job regardless of its schedule. `None` when it is
    /// missing or no longer `pending`.
    fn claim_one(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Mark the attempt for a claim as started, stamping `updated_at = now`.
    ///
    /// `claimed_at` is the `updated_at` the claim returned. `false` means the
    /// claim was superseded (swept and possibly claimed again) and the attempt
    /// must not run.
    fn begin_attempt(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Settle an `executing` job whose `updated_at` still equals `fence`.
    ///
    /// Fails with a conflict if the job is not `executing` any more, or if
    /// a newer claim or attempt start has moved `updated_at` on.
    fn resolve(
        &self,
        id: Uuid,
        fence: DateTime<Utc>,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Move a `pending` job to `cancelled`.
    fn cancel_if_pending(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// `executing` jobs whose last update is older than `cutoff`.
    fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>>;
}

const JOB_COLUMNS: &str = "id, payload, schedule_time, status, tags, created_at, updated_at,
                           executed_at, error_message, retry_count";

/// Timestamps are stored fixed-width so that text order is time order.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

/// Column values as they come off the row, decoded after the statement ends.
struct JobRow {
    id: String,
    payload: String,
    schedule_time: String,
    status: String,
    tags: String,
    created_at: String,
    updated_at: String,
    executed_at: Option<String>,
    error_message: Option<String>,
    retry_count: u32,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            payload: row.get(1)?,
            schedule_time: row.get(2)?,
            status: row.get(3)?,
            tags: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            executed_at: row.get(7)?,
            error_message: row.get(8)?,
            retry_count: row.get(9)?,
        })
    }

    fn decode(self) -> Result<Job> {
        Ok(Job {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| SchedulerError::Corrupt(format!("bad id {:?}: {e}", self.id)))?,
            payload: serde_json::from_str(&self.payload)?,
            schedule_time: parse_ts(&self.schedule_time)?,
            status: self.status.parse().map_err(SchedulerError::Corrupt)?,
            tags: serde_json::from_str(&self.tags)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            executed_at: self.executed_at.as_deref().map(parse_ts).transpose()?,
            error_message: self.error_message,
            retry_count: self.retry_count,
        })
    }
}

/// SQLite-backed [`JobStore`].
///
/// Several `SqliteStore`s (in one process or many) may share a database file;
/// exclusivity comes from the conditional updates, not from the mutex, which
/// only serialises use of this handle's connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, applying pragmas and the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    // A panic mid-statement leaves the connection itself usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(conn: &Connection, id: Uuid) -> Result<Option<Job>> {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            [id.to_string()],
            JobRow::from_row,
        )
        .optional()?
        .map(JobRow::decode)
        .transpose()
    }

    /// Explain why a conditional update matched no row.
    fn rejection(conn: &Connection, id: Uuid, to: JobStatus) -> SchedulerError {
        match Self::fetch(conn, id) {
            Ok(Some(job)) => SchedulerError::Conflict {
                id,
                from: job.status,
                to,
            },
            Ok(None) => SchedulerError::JobNotFound { id },
            Err(e) => e,
        }
    }

    fn query_jobs(conn: &Connection, sql: &str, args: Vec<Value>) -> Result<Vec<Job>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), JobRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(JobRow::decode).collect()
    }
}

impl JobStore for SqliteStore {
    fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        let now_str = format_ts(now);

        conn.execute(
            "INSERT INTO jobs
             (id, payload, schedule_time, status, tags, created_at, updated_at,
              executed_at, error_message, retry_count)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5, NULL, NULL, 0)",
            rusqlite::params![
                id.to_string(),
                serde_json::to_string(&job.payload)?,
                format_ts(job.schedule_time),
                serde_json::to_string(&job.tags)?,
                now_str,
            ],
        )?;

        info!(job_id = %id, schedule_time = %job.schedule_time, "job created");
        Self::fetch(&conn, id)?.ok_or(SchedulerError::JobNotFound { id })
    }

    fn get_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Self::fetch(&self.conn(), id)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Job>> {
        let mut sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            args.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(ref tag) = filter.tag {
            args.push(Value::Text(tag.clone()));
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM json_each(jobs.tags) WHERE json_each.value = ?{})",
                args.len()
            ));
        }

        sql.push_str(" ORDER BY schedule_time DESC, created_at DESC, id");

        // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
        let limit = if filter.limit == 0 { -1 } else { i64::from(filter.limit) };
        args.push(Value::Integer(limit));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));
        args.push(Value::Integer(i64::from(filter.offset)));
        sql.push_str(&format!(" OFFSET ?{}", args.len()));

        Self::query_jobs(&self.conn(), &sql, args)
    }

    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let now_str = format_ts(now);

        let candidates: Vec<String> = {
            let mut stmt = conn.prepare_cached(
                "SELECT id FROM jobs
                 WHERE status = 'pending' AND schedule_time <= ?1
                 ORDER BY schedule_time ASC, created_at ASC
                 LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(
                    rusqlite::params![now_str, i64::try_from(limit).unwrap_or(i64::MAX)],
                    |row| row.get(0),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        // One conditional write per candidate. The WHERE clause re-checks
        // eligibility, so a job that another scheduler claimed (or claimed,
        // failed and pushed into the future) since the SELECT is skipped.
        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let row = conn
                .query_row(
                    &format!(
                        "UPDATE jobs SET status = 'executing', updated_at = ?1
                         WHERE id = ?2 AND status = 'pending' AND schedule_time <= ?1
                         RETURNING {JOB_COLUMNS}"
                    ),
                    rusqlite::params![now_str, id],
                    JobRow::from_row,
                )
                .optional()?;
            match row {
                Some(row) => claimed.push(row.decode()?),
                None => debug!(job_id = %id, "claim lost to another scheduler"),
            }
        }
        Ok(claimed)
    }

    fn claim_one(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Job>> {
        self.conn()
            .query_row(
                &format!(
                    "UPDATE jobs SET status = 'executing', updated_at = ?1
                     WHERE id = ?2 AND status = 'pending'
                     RETURNING {JOB_COLUMNS}"
                ),
                rusqlite::params![format_ts(now), id.to_string()],
                JobRow::from_row,
            )
            .optional()?
            .map(JobRow::decode)
            .transpose()
    }

    fn begin_attempt(
        &self,
        id: Uuid,
        claimed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self.conn().execute(
            "UPDATE jobs SET updated_at = ?1
             WHERE id = ?2 AND status = 'executing' AND updated_at = ?3",
            rusqlite::params![format_ts(now), id.to_string(), format_ts(claimed_at)],
        )?;
        Ok(n == 1)
    }

    fn resolve(
        &self,
        id: Uuid,
        fence: DateTime<Utc>,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<()> {
        transition(id, JobStatus::Executing, resolution.status)?;
        let conn = self.conn();

        let n = conn.execute(
            "UPDATE jobs SET status = ?1, retry_count = ?2, error_message = ?3,
                    schedule_time = COALESCE(?4, schedule_time),
                    executed_at = COALESCE(?5, executed_at),
                    updated_at = ?6
             WHERE id = ?7 AND status = 'executing' AND updated_at = ?8",
            rusqlite::params![
                resolution.status.as_str(),
                resolution.retry_count,
                resolution.error_message,
                resolution.schedule_time.map(format_ts),
                resolution.executed_at.map(format_ts),
                format_ts(now),
                id.to_string(),
                format_ts(fence),
            ],
        )?;
        if n == 0 {
            return Err(Self::rejection(&conn, id, resolution.status));
        }
        debug!(job_id = %id, status = %resolution.status, retry_count = resolution.retry_count, "job resolved");
        Ok(())
    }

    fn cancel_if_pending(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE jobs SET status = 'cancelled', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![format_ts(now), id.to_string()],
        )?;
        if n == 0 {
            return Err(Self::rejection(&conn, id, JobStatus::Cancelled));
        }
        info!(job_id = %id, "job cancelled");
        Ok(())
    }

    fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        Self::query_jobs(
            &self.conn(),
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'executing' AND updated_at < ?1
                 ORDER BY updated_at ASC"
            ),
            vec![Value::Text(format_ts(cutoff))],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_job(at: DateTime<Utc>, tags: &[&str]) -> NewJob {
        NewJob {
            payload: json!({"employee": {"fullName": "Ada Lovelace"}}),
            schedule_time: at,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn failed(retry_count: u32, now: DateTime<Utc>) -> Resolution {
        Resolution {
            status: JobStatus::Failed,
            retry_count,
            error_message: Some("boom".into()),
            schedule_time: None,
            executed_at: Some(now),
        }
    }

    #[test]
    fn insert_assigns_identity_and_pending_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &["new-hire"]), t0()).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.created_at, t0());
        assert_eq!(job.updated_at, t0());
        assert_eq!(job.tags, vec!["new-hire".to_string()]);
        assert!(job.executed_at.is_none());
        assert_eq!(store.get_by_id(job.id).unwrap(), Some(job));
    }

    #[test]
    fn get_missing_returns_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn claim_due_takes_earliest_first_and_skips_future_jobs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let late = store.insert(new_job(t0() + Duration::minutes(5), &[]), t0()).unwrap();
        let early = store.insert(new_job(t0() - Duration::minutes(5), &[]), t0()).unwrap();
        let future = store.insert(new_job(t0() + Duration::hours(1), &[]), t0()).unwrap();

        let now = t0() + Duration::minutes(10);
        let claimed = store.claim_due(now, 10).unwrap();
        let ids: Vec<_> = claimed.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert!(claimed.iter().all(|j| j.status == JobStatus::Executing && j.updated_at == now));

        let untouched = store.get_by_id(future.id).unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Pending);
    }

    #[test]
    fn claim_due_respects_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert(new_job(t0() + Duration::seconds(i), &[]), t0()).unwrap();
        }
        let now = t0() + Duration::minutes(1);
        assert_eq!(store.claim_due(now, 2).unwrap().len(), 2);
        assert_eq!(store.claim_due(now, 0).unwrap().len(), 0);
        assert_eq!(store.claim_due(now, 10).unwrap().len(), 3);
    }

    #[test]
    fn claimed_job_is_not_claimed_again() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();

        assert_eq!(store.claim_due(t0(), 10).unwrap().len(), 1);
        assert!(store.claim_due(t0(), 10).unwrap().is_empty());
        assert!(store.claim_one(job.id, t0()).unwrap().is_none());
    }

    #[test]
    fn claim_one_ignores_schedule_but_requires_pending() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0() + Duration::days(3), &[]), t0()).unwrap();

        let claimed = store.claim_one(job.id, t0()).unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Executing);
        assert!(store.claim_one(job.id, t0()).unwrap().is_none());
        assert!(store.claim_one(Uuid::new_v4(), t0()).unwrap().is_none());
    }

    #[test]
    fn resolve_writes_every_field_at_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();
        let claimed = store.claim_one(job.id, t0()).unwrap().unwrap();

        let later = t0() + Duration::seconds(30);
        let retry_at = later + Duration::seconds(60);
        store
            .resolve(
                job.id,
                claimed.updated_at,
                &Resolution {
                    status: JobStatus::Pending,
                    retry_count: 1,
                    error_message: Some("API returned status 502: bad gateway".into()),
                    schedule_time: Some(retry_at),
                    executed_at: None,
                },
                later,
            )
            .unwrap();

        let stored = store.get_by_id(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.schedule_time, retry_at);
        assert_eq!(stored.updated_at, later);
        assert!(stored.executed_at.is_none());
        assert_eq!(
            stored.error_message.as_deref(),
            Some("API returned status 502: bad gateway")
        );
    }

    #[test]
    fn resolve_requires_executing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();

        let err = store.resolve(job.id, t0(), &failed(0, t0()), t0()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Conflict { from: JobStatus::Pending, to: JobStatus::Failed, .. }
        ));
        assert_eq!(store.get_by_id(job.id).unwrap().unwrap().status, JobStatus::Pending);

        let err = store
            .resolve(Uuid::new_v4(), t0(), &failed(0, t0()), t0())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound { .. }));
    }

    #[test]
    fn resolve_rejects_illegal_target_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.claim_one(job.id, t0()).unwrap();

        let mut res = failed(0, t0());
        res.status = JobStatus::Cancelled;
        assert_eq!(
            store.resolve(job.id, t0(), &res, t0()).unwrap_err().code(),
            "CONFLICT"
        );
        assert_eq!(store.get_by_id(job.id).unwrap().unwrap().status, JobStatus::Executing);
    }

    #[test]
    fn begin_attempt_requires_the_current_claim() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();
        let claimed = store.claim_one(job.id, t0()).unwrap().unwrap();

        let started = t0() + Duration::seconds(5);
        assert!(store.begin_attempt(job.id, claimed.updated_at, started).unwrap());
        assert_eq!(store.get_by_id(job.id).unwrap().unwrap().updated_at, started);

        // the claim token was consumed by the start above
        assert!(!store.begin_attempt(job.id, claimed.updated_at, started).unwrap());
        assert!(!store.begin_attempt(Uuid::new_v4(), t0(), started).unwrap());
    }

    #[test]
    fn superseded_attempt_cannot_resolve_the_newer_claim() {
        let store = SqliteStore::open_in_memory().unwrap();
        let job = store.insert(new_job(t0(), &[]), t0()).unwrap();
        let first = store.claim_one(job.id, t0()).unwrap().unwrap();

        // the first attempt is written off as abandoned and the job re-claimed
        let swept_at = t0() + Duration::minutes(20);
        store
            .resolve(
                job.id,
                first.updated_at,
                &Resolution {
                    status: JobStatus::Pending,
                    retry_count: 1,
                    error_message: Some("execution abandoned".into()),
                    schedule_time: None,
                    executed_at: None,
                },
                swept_at,
            )
            .unwrap();
        let reclaimed_at = swept_at + Duration::seconds(1);
        let second = store.claim_due(reclaimed_at, 10).unwrap().remove(0);
        assert_eq!(second.updated_at, reclaimed_at);

        // the stale attempt can neither start nor record an outcome
        assert!(!store.begin_attempt(job.id, first.updated_at, reclaimed_at).unwrap());
        let done = Resolution {
            status: JobStatus::Completed,
            retry_count: 0,
            error_message: None,
            schedule_time: None,
            executed_at: Some(reclaimed_at),
        };
        let err = store
            .resolve(job.id, first.updated_at, &done, reclaimed_at)
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Conflict { from: JobStatus::Executing, to: JobStatus::Completed, .. }
        ));
        let stored = store.get_by_id(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Executing);
        assert_eq!(stored.retry_count, 1);

        // the current claim still resolves
        store
            .resolve(job.id, second.updated_at, &done, reclaimed_at)
            .unwrap();
        assert_eq!(
            store.get_by_id(job.id).unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn cancel_only_from_pending() {
        let store = SqliteStore::open_in_memory().unwrap();

        let pending = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.cancel_if_pending(pending.id, t0()).unwrap();
        assert_eq!(
            store.get_by_id(pending.id).unwrap().unwrap().status,
            JobStatus::Cancelled
        );

        // cancelled, executing, completed and failed are all refused
        let executing = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.claim_one(executing.id, t0()).unwrap();

        let completed = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.claim_one(completed.id, t0()).unwrap();
        store
            .resolve(
                completed.id,
                t0(),
                &Resolution {
                    status: JobStatus::Completed,
                    retry_count: 0,
                    error_message: None,
                    schedule_time: None,
                    executed_at: Some(t0()),
                },
                t0(),
            )
            .unwrap();

        let failed_job = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.claim_one(failed_job.id, t0()).unwrap();
        store.resolve(failed_job.id, t0(), &failed(3, t0()), t0()).unwrap();

        for (id, status) in [
            (pending.id, JobStatus::Cancelled),
            (executing.id, JobStatus::Executing),
            (completed.id, JobStatus::Completed),
            (failed_job.id, JobStatus::Failed),
        ] {
            let err = store.cancel_if_pending(id, t0()).unwrap_err();
            assert!(
                matches!(err, SchedulerError::Conflict { from, .. } if from == status),
                "cancel of {status} job should conflict, got {err}"
            );
            assert_eq!(store.get_by_id(id).unwrap().unwrap().status, status);
        }

        let err = store.cancel_if_pending(Uuid::new_v4(), t0()).unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound { .. }));
    }

    #[test]
    fn listing_is_descending_and_paginated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                store
                    .insert(new_job(t0() + Duration::hours(i), &[]), t0())
                    .unwrap()
            })
            .collect();
        // a non-pending job in the middle must not shift the page
        let other = store.insert(new_job(t0() + Duration::minutes(150), &[]), t0()).unwrap();
        store.cancel_if_pending(other.id, t0()).unwrap();

        let page = store
            .list(&ListFilter {
                status: Some(JobStatus::Pending),
                tag: None,
                limit: 2,
                offset: 1,
            })
            .unwrap();

        let ids: Vec<_> = page.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![jobs[3].id, jobs[2].id]);
    }

    #[test]
    fn listing_filters_by_tag() {
        let store = SqliteStore::open_in_memory().unwrap();
        let hire = store.insert(new_job(t0(), &["new-hire", "engineering"]), t0()).unwrap();
        store.insert(new_job(t0(), &["contractor"]), t0()).unwrap();
        store.insert(new_job(t0(), &[]), t0()).unwrap();

        let tagged = store
            .list(&ListFilter {
                tag: Some("new-hire".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, hire.id);

        let all = store.list(&ListFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn stale_jobs_are_those_executing_past_cutoff() {
        let store = SqliteStore::open_in_memory().unwrap();
        let old = store.insert(new_job(t0(), &[]), t0()).unwrap();
        let fresh = store.insert(new_job(t0(), &[]), t0()).unwrap();
        store.insert(new_job(t0(), &[]), t0()).unwrap(); // still pending

        store.claim_one(old.id, t0()).unwrap();
        store.claim_one(fresh.id, t0() + Duration::minutes(20)).unwrap();

        let stale = store.list_stale(t0() + Duration::minutes(15)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }
}
