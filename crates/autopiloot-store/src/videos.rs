use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use autopiloot_types::{RagRef, SummaryRecord, TranscriptRecord, VideoRecord, VideoStatus};

use crate::db::{ts, StateStore};
use crate::error::{StoreError, StoreResult};

/// Back-reference fields applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct VideoTransitionExtra {
    pub summary_doc_ref: Option<String>,
    pub summary_drive_id: Option<String>,
    pub zep_doc_id: Option<String>,
    pub rag_refs: Option<Vec<RagRef>>,
    pub rejection_reason: Option<String>,
}

impl StateStore {
    /// Insert or refresh video metadata. The first write stamps
    /// `created_at`; later writes keep it (and the status progression)
    /// and only refresh metadata plus `updated_at`.
    pub async fn upsert_video(&self, incoming: &VideoRecord) -> StoreResult<VideoRecord> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        let existing = read_video(&conn, &incoming.video_id)?;

        let record = match existing {
            Some(current) => VideoRecord {
                created_at: current.created_at,
                updated_at: now,
                status: current.status,
                summary_doc_ref: current.summary_doc_ref,
                summary_drive_id: current.summary_drive_id,
                zep_doc_id: current.zep_doc_id,
                rag_refs: current.rag_refs,
                rejection_reason: current.rejection_reason,
                ..incoming.clone()
            },
            None => VideoRecord {
                created_at: now,
                updated_at: now,
                ..incoming.clone()
            },
        };

        write_video(&conn, &record)?;
        Ok(record)
    }

    /// Absence is a `None`, never an error.
    pub async fn get_video(&self, video_id: &str) -> StoreResult<Option<VideoRecord>> {
        let conn = self.conn.lock().await;
        read_video(&conn, video_id)
    }

    /// Compare-and-set status advance. Aborts with [`StoreError::StaleState`]
    /// when a concurrent writer already moved the record, and with
    /// [`StoreError::InvalidTransition`] when the requested step is not on
    /// the legal progression.
    pub async fn transition_video_status(
        &self,
        video_id: &str,
        expected: VideoStatus,
        new_status: VideoStatus,
        extra: VideoTransitionExtra,
    ) -> StoreResult<VideoRecord> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let record = transition_in_tx(&tx, video_id, expected, new_status, extra)?;
        tx.commit()?;
        Ok(record)
    }

    pub async fn videos_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<VideoRecord>> {
        self.videos_in_range("created_at", start, end).await
    }

    pub async fn videos_updated_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<VideoRecord>> {
        self.videos_in_range("updated_at", start, end).await
    }

    async fn videos_in_range(
        &self,
        column: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<VideoRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM videos WHERE {column} >= ?1 AND {column} < ?2 ORDER BY {column} ASC"
        ))?;
        let rows = stmt.query_map(params![ts(start), ts(end)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut videos = Vec::new();
        for doc in rows {
            videos.push(serde_json::from_str(&doc?)?);
        }
        Ok(videos)
    }

    pub async fn get_transcript(&self, video_id: &str) -> StoreResult<Option<TranscriptRecord>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM transcripts WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    pub async fn get_summary(&self, video_id: &str) -> StoreResult<Option<SummaryRecord>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM summaries WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Commit a finished transcription: transcript document, the
    /// `transcription_queued -> transcribed` advance, and the cost-ledger
    /// increment, all in one transaction.
    pub async fn complete_transcription(
        &self,
        transcript: &TranscriptRecord,
    ) -> StoreResult<VideoRecord> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let video = transition_in_tx(
            &tx,
            &transcript.video_id,
            VideoStatus::TranscriptionQueued,
            VideoStatus::Transcribed,
            VideoTransitionExtra::default(),
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO transcripts (video_id, created_at, doc) VALUES (?1, ?2, ?3)",
            params![
                transcript.video_id,
                ts(transcript.created_at),
                serde_json::to_string(transcript)?
            ],
        )?;

        let date = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        add_cost_in_tx(&tx, &date, "transcription_usd", transcript.transcription_cost_usd)?;

        tx.commit()?;
        Ok(video)
    }

    /// Commit a finished summary: summary document, the
    /// `transcribed -> summarized` advance, and the back-references on the
    /// video, all in one transaction.
    pub async fn complete_summary(&self, summary: &SummaryRecord) -> StoreResult<VideoRecord> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let extra = VideoTransitionExtra {
            summary_doc_ref: Some(format!("summaries/{}", summary.video_id)),
            summary_drive_id: summary.short_drive_id.clone(),
            zep_doc_id: summary.zep_doc_id.clone(),
            rag_refs: Some(summary.rag_refs.clone()),
            rejection_reason: None,
        };
        let video = transition_in_tx(
            &tx,
            &summary.video_id,
            VideoStatus::Transcribed,
            VideoStatus::Summarized,
            extra,
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO summaries (video_id, created_at, doc) VALUES (?1, ?2, ?3)",
            params![
                summary.video_id,
                ts(summary.created_at),
                serde_json::to_string(summary)?
            ],
        )?;

        tx.commit()?;
        Ok(video)
    }
}

fn read_video(conn: &Connection, video_id: &str) -> StoreResult<Option<VideoRecord>> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT doc FROM videos WHERE video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
}

fn write_video(conn: &Connection, record: &VideoRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO videos (video_id, status, source, created_at, updated_at, doc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.video_id,
            record.status.as_str(),
            record.source.as_str(),
            ts(record.created_at),
            ts(record.updated_at),
            serde_json::to_string(record)?
        ],
    )?;
    Ok(())
}

pub(crate) fn transition_in_tx(
    tx: &rusqlite::Transaction<'_>,
    video_id: &str,
    expected: VideoStatus,
    new_status: VideoStatus,
    extra: VideoTransitionExtra,
) -> StoreResult<VideoRecord> {
    let doc: Option<String> = tx
        .query_row(
            "SELECT doc FROM videos WHERE video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )
        .optional()?;
    let mut record: VideoRecord = match doc {
        Some(d) => serde_json::from_str(&d)?,
        None => return Err(StoreError::NotFound(format!("videos/{video_id}"))),
    };

    if record.status != expected {
        return Err(StoreError::StaleState {
            video_id: video_id.to_string(),
            expected,
            actual: record.status,
        });
    }
    if !expected.can_transition_to(new_status) {
        return Err(StoreError::InvalidTransition {
            video_id: video_id.to_string(),
            from: expected,
            to: new_status,
        });
    }

    record.status = new_status;
    record.updated_at = Utc::now();
    if let Some(summary_doc_ref) = extra.summary_doc_ref {
        record.summary_doc_ref = Some(summary_doc_ref);
    }
    if let Some(summary_drive_id) = extra.summary_drive_id {
        record.summary_drive_id = Some(summary_drive_id);
    }
    if let Some(zep_doc_id) = extra.zep_doc_id {
        record.zep_doc_id = Some(zep_doc_id);
    }
    if let Some(rag_refs) = extra.rag_refs {
        record.rag_refs = rag_refs;
    }
    if let Some(rejection_reason) = extra.rejection_reason {
        record.rejection_reason = Some(rejection_reason);
    }

    tx.execute(
        "UPDATE videos SET status = ?2, updated_at = ?3, doc = ?4 WHERE video_id = ?1",
        params![
            video_id,
            record.status.as_str(),
            ts(record.updated_at),
            serde_json::to_string(&record)?
        ],
    )?;
    Ok(record)
}

pub(crate) fn add_cost_in_tx(
    tx: &rusqlite::Transaction<'_>,
    date: &str,
    column: &str,
    amount: f64,
) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO costs_daily (date) VALUES (?1) ON CONFLICT(date) DO NOTHING",
        params![date],
    )?;
    tx.execute(
        &format!(
            "UPDATE costs_daily SET {column} = {column} + ?2, total_usd = total_usd + ?2 WHERE date = ?1"
        ),
        params![date, amount],
    )?;
    Ok(())
}
