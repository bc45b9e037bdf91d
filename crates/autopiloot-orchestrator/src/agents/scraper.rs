//! Discovery: channel scraping with checkpoint-based incremental pickup,
//! and sheet backfill for link-bearing spreadsheets.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use autopiloot_core::idempotency::{canonical_watch_url, extract_video_id};
use autopiloot_policy::{decide, Decision, JobContext, SystemState, TargetItem};
use autopiloot_providers::{youtube::UNITS_PER_CHANNEL_SCAN, UploadItem};
use autopiloot_types::{
    Checkpoint, ErrorType, JobInputs, JobPriority, JobRecord, JobStatus, JobType, PolicyOverrides,
    VideoRecord, VideoSource, VideoStatus,
};

use super::{RunFailure, Runners};
use crate::audit;
use crate::policy_limits;

const CHECKPOINT_SERVICE: &str = "youtube_uploads";
const DEFAULT_SHEET_RANGE: &str = "Sheet1!A:D";

impl Runners {
    pub(super) async fn run_channel_scrape(
        &self,
        job: &JobRecord,
        channels: &[String],
        limit_per_channel: Option<u32>,
    ) -> anyhow::Result<Value> {
        let handles = &self.orchestrator.handles;
        let limit =
            limit_per_channel.unwrap_or(handles.config.scraper.daily_limit_per_channel);
        let now = Utc::now();
        let today = now.date_naive();

        let mut discovered = 0u64;
        let mut queued = 0u64;
        let mut skipped_checkpoint = 0u64;
        let mut skipped_too_long = 0u64;

        for handle in channels {
            let channel_id = self
                .collaborators
                .channel_source
                .resolve_handle(handle)
                .await?;
            handles
                .store
                .add_quota_usage(today, "youtube", UNITS_PER_CHANNEL_SCAN)
                .await?;

            let checkpoint = handles
                .store
                .get_checkpoint(CHECKPOINT_SERVICE, &channel_id)
                .await?;
            let since = checkpoint.as_ref().and_then(|c| c.last_published_at);

            let uploads = self
                .collaborators
                .channel_source
                .list_uploads(&channel_id, since, now, limit)
                .await?;
            debug!(%handle, %channel_id, count = uploads.len(), "channel uploads listed");

            let limits = policy_limits(&handles.config);
            let mut latest = checkpoint;

            for item in uploads.into_iter().take(limit as usize) {
                // The checkpoint gate catches items the incremental window
                // already covered (restart replays, boundary overlaps).
                let ctx = JobContext {
                    job_id: job.job_id.clone(),
                    job_type: JobType::ChannelScrape,
                    retry_count: 0,
                    last_attempt_at: None,
                    error_type: None,
                    target: Some(TargetItem {
                        video_id: item.video_id.clone(),
                        published_at: Some(item.published_at),
                    }),
                    estimated_cost_usd: None,
                    video_count: 1,
                };
                let state = SystemState {
                    checkpoint: latest.clone(),
                    ..SystemState::default()
                };
                if let Decision::Skip { reason } =
                    decide(&ctx, &state, None, &limits, now)
                {
                    debug!(video_id = %item.video_id, %reason, "skipped by checkpoint");
                    skipped_checkpoint += 1;
                    continue;
                }

                discovered += 1;
                let outcome = self
                    .ingest_video(&item, Some(channel_id.clone()), VideoSource::Scrape)
                    .await?;
                match outcome {
                    IngestOutcome::Queued => queued += 1,
                    IngestOutcome::SkippedTooLong => skipped_too_long += 1,
                    IngestOutcome::AlreadyProcessed => {}
                }

                let advanced = Checkpoint {
                    service: CHECKPOINT_SERVICE.to_string(),
                    scope: channel_id.clone(),
                    last_published_at: Some(item.published_at),
                    last_processed_id: Some(item.video_id.clone()),
                    updated_at: Utc::now(),
                };
                handles.store.upsert_checkpoint(&advanced).await?;
                latest = Some(advanced);
            }

            if let Some(checkpoint) = &latest {
                handles
                    .audit
                    .checkpoint_advanced(
                        CHECKPOINT_SERVICE,
                        &channel_id,
                        checkpoint.last_processed_id.as_deref().unwrap_or(""),
                    )
                    .await;
            }
        }

        info!(discovered, queued, skipped_too_long, "channel scrape finished");
        Ok(json!({
            "channels_processed": channels.len(),
            "videos_discovered": discovered,
            "videos_queued": queued,
            "videos_skipped_checkpoint": skipped_checkpoint,
            "videos_skipped_too_long": skipped_too_long,
        }))
    }

    pub(super) async fn run_sheet_backfill(
        &self,
        sheet_id: &str,
        range: Option<&str>,
    ) -> anyhow::Result<Value> {
        let sheet_source = self.collaborators.sheet_source.as_ref().ok_or_else(|| {
            RunFailure::new(
                ErrorType::InvalidConfiguration,
                "no sheet source configured for sheet_backfill",
            )
        })?;

        let range = range.unwrap_or(DEFAULT_SHEET_RANGE);
        let urls = sheet_source.read_video_urls(sheet_id, range).await?;

        let mut ingested = 0u64;
        let mut queued = 0u64;
        let mut invalid = 0u64;

        for url in urls {
            let Ok(video_id) = extract_video_id(&url) else {
                invalid += 1;
                continue;
            };

            let item = match self
                .collaborators
                .channel_source
                .lookup_video(&video_id)
                .await?
            {
                Some(item) => item,
                None => {
                    invalid += 1;
                    continue;
                }
            };

            ingested += 1;
            if matches!(
                self.ingest_video(&item, None, VideoSource::Sheet).await?,
                IngestOutcome::Queued
            ) {
                queued += 1;
            }
        }

        info!(sheet_id, ingested, queued, invalid, "sheet backfill finished");
        Ok(json!({
            "sheet_id": sheet_id,
            "range": range,
            "videos_ingested": ingested,
            "videos_queued": queued,
            "rows_without_video": invalid,
        }))
    }

    /// Save metadata and, when eligible, queue transcription atomically
    /// with the status advance.
    async fn ingest_video(
        &self,
        item: &UploadItem,
        channel_id: Option<String>,
        source: VideoSource,
    ) -> anyhow::Result<IngestOutcome> {
        let handles = &self.orchestrator.handles;
        let now = Utc::now();

        let record = VideoRecord {
            video_id: item.video_id.clone(),
            url: canonical_watch_url(&item.video_id),
            title: item.title.clone(),
            published_at: item.published_at,
            channel_id,
            duration_sec: item.duration_sec,
            source,
            status: VideoStatus::Discovered,
            created_at: now,
            updated_at: now,
            summary_doc_ref: None,
            summary_drive_id: None,
            zep_doc_id: None,
            rag_refs: Vec::new(),
            rejection_reason: None,
        };
        let saved = handles.store.upsert_video(&record).await?;

        if saved.status != VideoStatus::Discovered {
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        let max_duration = handles.config.idempotency.max_video_duration_sec;
        if item.duration_sec > max_duration {
            debug!(
                video_id = item.video_id,
                duration_sec = item.duration_sec,
                "over the transcription duration ceiling; left as discovered"
            );
            return Ok(IngestOutcome::SkippedTooLong);
        }

        if handles.store.get_transcript(&item.video_id).await?.is_some() {
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        let queue_job = JobRecord {
            job_id: format!("single_video_{}", item.video_id),
            inputs: JobInputs::SingleVideo {
                video_id: item.video_id.clone(),
                priority: None,
            },
            policy_overrides: PolicyOverrides::default(),
            status: JobStatus::Pending,
            retry_count: 0,
            priority: JobPriority::Medium,
            created_at: now,
            created_by: audit::ACTOR.to_string(),
            last_attempt_at: None,
            last_error_type: None,
            estimated_quota_units: None,
            estimated_cost_usd: Some(0.5),
            estimated_output_tokens: None,
        };

        match handles
            .store
            .enqueue_transcription(&queue_job, &item.video_id)
            .await
        {
            Ok(()) => Ok(IngestOutcome::Queued),
            // A concurrent enqueue won; their queue entry stands.
            Err(err) if err.is_stale_state() => Ok(IngestOutcome::AlreadyProcessed),
            Err(err) => Err(err.into()),
        }
    }
}

enum IngestOutcome {
    Queued,
    SkippedTooLong,
    AlreadyProcessed,
}
