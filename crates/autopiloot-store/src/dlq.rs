use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, OptionalExtension};

use autopiloot_types::{DlqEntry, JobType, Severity};

use crate::db::{ts, StateStore};
use crate::error::StoreResult;
use crate::jobs::InsertOutcome;

/// Filtered window over the dead-letter collection.
///
/// `video_id` matching is applied in memory *after* the range query and the
/// page limit, searching both the denormalized fields and the original
/// inputs; a window dominated by non-matching entries can therefore starve
/// the page. Known limitation, kept for parity with the hosted store.
#[derive(Debug, Clone, Default)]
pub struct DlqQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub job_type: Option<JobType>,
    pub severity: Option<Severity>,
    pub video_id: Option<String>,
    pub limit: Option<u32>,
}

impl StateStore {
    /// Write a DLQ entry; an existing entry under the same id wins.
    pub async fn insert_dlq(&self, entry: &DlqEntry) -> StoreResult<InsertOutcome> {
        let conn = self.conn.lock().await;
        let existing: Option<String> = conn
            .query_row(
                "SELECT dlq_id FROM jobs_deadletter WHERE dlq_id = ?1",
                rusqlite::params![entry.dlq_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }

        conn.execute(
            "INSERT INTO jobs_deadletter (dlq_id, job_type, severity, dlq_created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                entry.dlq_id,
                entry.job_type.as_str(),
                entry.severity.as_str(),
                ts(entry.dlq_created_at),
                serde_json::to_string(entry)?
            ],
        )?;
        Ok(InsertOutcome::Inserted)
    }

    pub async fn get_dlq(&self, dlq_id: &str) -> StoreResult<Option<DlqEntry>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM jobs_deadletter WHERE dlq_id = ?1",
                rusqlite::params![dlq_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Newest-first page of DLQ entries matching the query.
    pub async fn query_dlq(&self, query: &DlqQuery) -> StoreResult<Vec<DlqEntry>> {
        let conn = self.conn.lock().await;

        let mut sql = String::from("SELECT doc FROM jobs_deadletter WHERE 1=1");
        let mut args: Vec<String> = Vec::new();
        if let Some(since) = query.since {
            args.push(ts(since));
            sql.push_str(&format!(" AND dlq_created_at >= ?{}", args.len()));
        }
        if let Some(until) = query.until {
            args.push(ts(until));
            sql.push_str(&format!(" AND dlq_created_at < ?{}", args.len()));
        }
        if let Some(job_type) = query.job_type {
            args.push(job_type.as_str().to_string());
            sql.push_str(&format!(" AND job_type = ?{}", args.len()));
        }
        if let Some(severity) = query.severity {
            args.push(severity.as_str().to_string());
            sql.push_str(&format!(" AND severity = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY dlq_created_at DESC");
        if let Some(limit) = query.limit {
            // limit is a bounded u32, never caller-supplied text.
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut entries: Vec<DlqEntry> = Vec::new();
        for doc in rows {
            entries.push(serde_json::from_str(&doc?)?);
        }

        if let Some(video_id) = &query.video_id {
            entries.retain(|entry| entry.mentions_video(video_id));
        }
        Ok(entries)
    }

    pub async fn count_dlq_since(&self, since: DateTime<Utc>) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs_deadletter WHERE dlq_created_at >= ?1",
            rusqlite::params![ts(since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
