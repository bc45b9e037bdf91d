use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::StoreResult;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS videos (
    video_id    TEXT PRIMARY KEY,
    status      TEXT NOT NULL,
    source      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at);
CREATE INDEX IF NOT EXISTS idx_videos_updated ON videos(updated_at);
CREATE INDEX IF NOT EXISTS idx_videos_status  ON videos(status);

CREATE TABLE IF NOT EXISTS transcripts (
    video_id    TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries (
    video_id    TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs_active (
    agent       TEXT NOT NULL,
    job_id      TEXT NOT NULL,
    job_type    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    doc         TEXT NOT NULL,
    PRIMARY KEY (agent, job_id)
);

CREATE TABLE IF NOT EXISTS jobs_deadletter (
    dlq_id          TEXT PRIMARY KEY,
    job_type        TEXT NOT NULL,
    severity        TEXT NOT NULL,
    dlq_created_at  TEXT NOT NULL,
    doc             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dlq_created ON jobs_deadletter(dlq_created_at);

CREATE TABLE IF NOT EXISTS checkpoints (
    checkpoint_key  TEXT PRIMARY KEY,
    updated_at      TEXT NOT NULL,
    doc             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS costs_daily (
    date              TEXT PRIMARY KEY,
    total_usd         REAL NOT NULL DEFAULT 0,
    transcription_usd REAL NOT NULL DEFAULT 0,
    llm_usd           REAL NOT NULL DEFAULT 0,
    other_usd         REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS quota_daily (
    date        TEXT NOT NULL,
    service     TEXT NOT NULL,
    units_used  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (date, service)
);

CREATE TABLE IF NOT EXISTS audit_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    actor      TEXT NOT NULL,
    action     TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    details    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_action_time ON audit_logs(action, timestamp);
";

/// Connection manager for the Autopiloot state database.
pub struct StateStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn).await
    }

    /// Private throwaway database, used by tests and dry runs.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(10))?;
        // WAL for concurrent readers; the pragma returns a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(())).ok();
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Second-precision UTC string used for every stored timestamp. The fixed
/// width keeps lexicographic and chronological order identical, which the
/// range queries rely on.
pub(crate) fn ts(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
