use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use autopiloot_types::{Agent, ErrorType, JobRecord, JobStatus, VideoStatus};

use crate::db::{ts, StateStore};
use crate::error::StoreResult;
use crate::videos::{transition_in_tx, VideoTransitionExtra};

/// Result of writing a job record keyed by an idempotent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl StateStore {
    /// Write a job record unless one with the same id is already active.
    pub async fn insert_job(&self, job: &JobRecord) -> StoreResult<InsertOutcome> {
        let conn = self.conn.lock().await;
        let agent = job.agent();
        let existing: Option<String> = conn
            .query_row(
                "SELECT job_id FROM jobs_active WHERE agent = ?1 AND job_id = ?2",
                params![agent.as_str(), job.job_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }

        conn.execute(
            "INSERT INTO jobs_active (agent, job_id, job_type, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent.as_str(),
                job.job_id,
                job.job_type().as_str(),
                ts(job.created_at),
                serde_json::to_string(job)?
            ],
        )?;
        Ok(InsertOutcome::Inserted)
    }

    pub async fn get_job(&self, agent: Agent, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM jobs_active WHERE agent = ?1 AND job_id = ?2",
                params![agent.as_str(), job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Remove an active job; returns whether a record was deleted.
    pub async fn delete_job(&self, agent: Agent, job_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM jobs_active WHERE agent = ?1 AND job_id = ?2",
            params![agent.as_str(), job_id],
        )?;
        Ok(deleted > 0)
    }

    pub async fn list_active_jobs(&self, agent: Agent) -> StoreResult<Vec<JobRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT doc FROM jobs_active WHERE agent = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![agent.as_str()], |row| row.get::<_, String>(0))?;
        let mut jobs = Vec::new();
        for doc in rows {
            jobs.push(serde_json::from_str(&doc?)?);
        }
        Ok(jobs)
    }

    /// First active job for `agent` that already covers `video_id`. Backs
    /// the one-active-job-per-(video, operation) invariant; active sets are
    /// small, so the scan stays in memory.
    pub async fn find_active_job_for_video(
        &self,
        agent: Agent,
        video_id: &str,
    ) -> StoreResult<Option<JobRecord>> {
        let jobs = self.list_active_jobs(agent).await?;
        Ok(jobs
            .into_iter()
            .find(|job| job.inputs.video_ids().contains(&video_id)))
    }

    pub async fn has_active_job_for_video(
        &self,
        agent: Agent,
        video_id: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .find_active_job_for_video(agent, video_id)
            .await?
            .is_some())
    }

    /// Record an execution attempt on a retained job.
    pub async fn record_job_attempt(
        &self,
        agent: Agent,
        job_id: &str,
        status: JobStatus,
        retry_count: u32,
        attempted_at: DateTime<Utc>,
        error_type: Option<ErrorType>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM jobs_active WHERE agent = ?1 AND job_id = ?2",
                params![agent.as_str(), job_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(doc) = doc else {
            return Ok(()); // job already completed or routed away
        };
        let mut job: JobRecord = serde_json::from_str(&doc)?;
        job.status = status;
        job.retry_count = retry_count;
        job.last_attempt_at = Some(attempted_at);
        job.last_error_type = error_type;
        conn.execute(
            "UPDATE jobs_active SET doc = ?3 WHERE agent = ?1 AND job_id = ?2",
            params![agent.as_str(), job_id, serde_json::to_string(&job)?],
        )?;
        Ok(())
    }

    /// Queue a video for transcription: the job record and the
    /// `discovered -> transcription_queued` advance commit together. A
    /// stale-state abort from a concurrent enqueue leaves no partial write.
    pub async fn enqueue_transcription(&self, job: &JobRecord, video_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        transition_in_tx(
            &tx,
            video_id,
            VideoStatus::Discovered,
            VideoStatus::TranscriptionQueued,
            VideoTransitionExtra::default(),
        )?;

        tx.execute(
            "INSERT OR IGNORE INTO jobs_active (agent, job_id, job_type, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.agent().as_str(),
                job.job_id,
                job.job_type().as_str(),
                ts(job.created_at),
                serde_json::to_string(job)?
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}
