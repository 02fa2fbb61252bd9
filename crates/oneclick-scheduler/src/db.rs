use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// How long a writer waits on another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply connection-level settings shared by every store connection.
///
/// WAL lets the HTTP handlers read while the engine writes; the busy timeout
/// makes concurrent claimers queue on the write lock instead of failing.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(())
}

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) plus the indexes used by the claim
/// query and the listing endpoint.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id             TEXT    NOT NULL PRIMARY KEY,
            payload        TEXT    NOT NULL,   -- opaque JSON forwarded to the API
            schedule_time  TEXT    NOT NULL,   -- RFC 3339, fixed width, UTC
            status         TEXT    NOT NULL DEFAULT 'pending',
            tags           TEXT    NOT NULL DEFAULT '[]',  -- JSON array
            created_at     TEXT    NOT NULL,
            updated_at     TEXT    NOT NULL,
            executed_at    TEXT,
            error_message  TEXT,
            retry_count    INTEGER NOT NULL DEFAULT 0,
            CHECK (status IN ('pending', 'executing', 'completed', 'failed', 'cancelled'))
        ) STRICT;

        -- Claim query: WHERE status = 'pending' AND schedule_time <= ? ORDER BY schedule_time
        CREATE INDEX IF NOT EXISTS idx_jobs_status_schedule ON jobs (status, schedule_time);
        CREATE INDEX IF NOT EXISTS idx_jobs_schedule_time ON jobs (schedule_time);
        ",
    )?;
    Ok(())
}
