use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;

use autopiloot_store::{
    CostCategory, DlqQuery, InsertOutcome, StateStore, StoreError, VideoTransitionExtra,
};
use autopiloot_types::{
    AuditLogEntry, Checkpoint, DlqEntry, ErrorType, FailureContext, JobInputs, JobPriority,
    JobRecord, JobStatus, JobType, PolicyOverrides, RecoveryPriority, Severity, SummaryRecord,
    TokenUsage, TranscriptRecord, VideoRecord, VideoSource, VideoStatus,
};

fn video(video_id: &str) -> VideoRecord {
    let now = Utc::now();
    VideoRecord {
        video_id: video_id.to_string(),
        url: format!("https://www.youtube.com/watch?v={video_id}"),
        title: "How to scale".to_string(),
        published_at: now - Duration::hours(3),
        channel_id: Some("UC123".to_string()),
        duration_sec: 1800,
        source: VideoSource::Scrape,
        status: VideoStatus::Discovered,
        created_at: now,
        updated_at: now,
        summary_doc_ref: None,
        summary_drive_id: None,
        zep_doc_id: None,
        rag_refs: Vec::new(),
        rejection_reason: None,
    }
}

fn job(job_id: &str, inputs: JobInputs) -> JobRecord {
    JobRecord {
        job_id: job_id.to_string(),
        inputs,
        policy_overrides: PolicyOverrides::default(),
        status: JobStatus::Pending,
        retry_count: 0,
        priority: JobPriority::Medium,
        created_at: Utc::now(),
        created_by: "orchestrator".to_string(),
        last_attempt_at: None,
        last_error_type: None,
        estimated_quota_units: None,
        estimated_cost_usd: None,
        estimated_output_tokens: None,
    }
}

fn transcript(video_id: &str) -> TranscriptRecord {
    TranscriptRecord {
        video_id: video_id.to_string(),
        drive_id_txt: "drive-txt-1".to_string(),
        drive_id_json: "drive-json-1".to_string(),
        digest: "abc123".to_string(),
        created_at: Utc::now(),
        transcription_cost_usd: 0.42,
    }
}

fn summary(video_id: &str) -> SummaryRecord {
    SummaryRecord {
        video_id: video_id.to_string(),
        bullets: vec!["Raise prices".to_string()],
        key_concepts: vec!["pricing power".to_string()],
        prompt_id: "coach_v2".to_string(),
        prompt_version: "v2".to_string(),
        token_usage: TokenUsage::new(1200, 300),
        transcript_doc_ref: format!("transcripts/{video_id}"),
        transcript_drive_id_txt: "drive-txt-1".to_string(),
        transcript_drive_id_json: "drive-json-1".to_string(),
        short_drive_id: Some("drive-md-1".to_string()),
        zep_doc_id: Some("zep-1".to_string()),
        zep_collection: Some("autopiloot_guidelines".to_string()),
        rag_refs: Vec::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn upsert_preserves_created_at_and_status() {
    let store = StateStore::open_in_memory().await.unwrap();
    let first = store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();

    store
        .transition_video_status(
            "dQw4w9WgXcQ",
            VideoStatus::Discovered,
            VideoStatus::TranscriptionQueued,
            VideoTransitionExtra::default(),
        )
        .await
        .unwrap();

    // A re-discovery of the same video must not regress the progression.
    let mut refreshed = video("dQw4w9WgXcQ");
    refreshed.title = "How to scale (updated)".to_string();
    let second = store.upsert_video(&refreshed).await.unwrap();

    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.status, VideoStatus::TranscriptionQueued);
    assert_eq!(second.title, "How to scale (updated)");
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
async fn get_video_absence_is_none_not_error() {
    let store = StateStore::open_in_memory().await.unwrap();
    assert!(store.get_video("missing00000").await.unwrap().is_none());
}

#[tokio::test]
async fn stale_transition_aborts_without_effect() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();

    let err = store
        .transition_video_status(
            "dQw4w9WgXcQ",
            VideoStatus::TranscriptionQueued,
            VideoStatus::Transcribed,
            VideoTransitionExtra::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_stale_state());

    let current = store.get_video("dQw4w9WgXcQ").await.unwrap().unwrap();
    assert_eq!(current.status, VideoStatus::Discovered);
}

#[tokio::test]
async fn backward_transition_is_rejected() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();

    let err = store
        .transition_video_status(
            "dQw4w9WgXcQ",
            VideoStatus::Discovered,
            VideoStatus::Summarized,
            VideoTransitionExtra::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn duplicate_job_insert_reports_already_exists() {
    let store = StateStore::open_in_memory().await.unwrap();
    let record = job(
        "channel_scrape_20250127_010000",
        JobInputs::ChannelScrape {
            channels: vec!["@AlexHormozi".to_string()],
            limit_per_channel: Some(10),
        },
    );

    assert_eq!(store.insert_job(&record).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(
        store.insert_job(&record).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
    assert_eq!(
        store
            .list_active_jobs(autopiloot_types::Agent::Scraper)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn transcription_completion_commits_all_three_writes() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();
    store
        .transition_video_status(
            "dQw4w9WgXcQ",
            VideoStatus::Discovered,
            VideoStatus::TranscriptionQueued,
            VideoTransitionExtra::default(),
        )
        .await
        .unwrap();

    let updated = store
        .complete_transcription(&transcript("dQw4w9WgXcQ"))
        .await
        .unwrap();
    assert_eq!(updated.status, VideoStatus::Transcribed);

    let stored = store.get_transcript("dQw4w9WgXcQ").await.unwrap().unwrap();
    assert_eq!(stored.digest, "abc123");

    let costs = store
        .get_daily_costs(Utc::now().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!((costs.transcription_usd - 0.42).abs() < 1e-9);
    assert!((costs.total_usd - 0.42).abs() < 1e-9);
}

#[tokio::test]
async fn transcription_completion_requires_queued_status() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();

    let err = store
        .complete_transcription(&transcript("dQw4w9WgXcQ"))
        .await
        .unwrap_err();
    assert!(err.is_stale_state());

    // Nothing from the aborted transaction may be visible.
    assert!(store.get_transcript("dQw4w9WgXcQ").await.unwrap().is_none());
    assert!(store
        .get_daily_costs(Utc::now().date_naive())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn summary_completion_writes_back_references() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();
    store
        .transition_video_status(
            "dQw4w9WgXcQ",
            VideoStatus::Discovered,
            VideoStatus::TranscriptionQueued,
            VideoTransitionExtra::default(),
        )
        .await
        .unwrap();
    store
        .complete_transcription(&transcript("dQw4w9WgXcQ"))
        .await
        .unwrap();

    let updated = store.complete_summary(&summary("dQw4w9WgXcQ")).await.unwrap();
    assert_eq!(updated.status, VideoStatus::Summarized);
    assert_eq!(updated.summary_doc_ref.as_deref(), Some("summaries/dQw4w9WgXcQ"));
    assert_eq!(updated.zep_doc_id.as_deref(), Some("zep-1"));
    assert!(store.get_summary("dQw4w9WgXcQ").await.unwrap().is_some());
}

#[tokio::test]
async fn enqueue_transcription_is_atomic_with_the_status() {
    let store = StateStore::open_in_memory().await.unwrap();
    store.upsert_video(&video("dQw4w9WgXcQ")).await.unwrap();

    let queue_job = job(
        "single_video_dQw4w9WgXcQ",
        JobInputs::SingleVideo {
            video_id: "dQw4w9WgXcQ".to_string(),
            priority: None,
        },
    );
    store
        .enqueue_transcription(&queue_job, "dQw4w9WgXcQ")
        .await
        .unwrap();

    let current = store.get_video("dQw4w9WgXcQ").await.unwrap().unwrap();
    assert_eq!(current.status, VideoStatus::TranscriptionQueued);
    assert!(store
        .has_active_job_for_video(autopiloot_types::Agent::Transcriber, "dQw4w9WgXcQ")
        .await
        .unwrap());

    // Second enqueue loses the compare-and-set and leaves one job.
    let err = store
        .enqueue_transcription(&queue_job, "dQw4w9WgXcQ")
        .await
        .unwrap_err();
    assert!(err.is_stale_state());
    assert_eq!(
        store
            .list_active_jobs(autopiloot_types::Agent::Transcriber)
            .await
            .unwrap()
            .len(),
        1
    );
}

fn dlq_entry(dlq_id: &str, job_type: JobType, minutes_ago: i64) -> DlqEntry {
    DlqEntry {
        dlq_id: dlq_id.to_string(),
        original_job_id: "job-1".to_string(),
        job_type,
        failure_context: FailureContext {
            error_type: ErrorType::ApiTimeout,
            error_message: "timeout".to_string(),
            retry_count: 3,
            last_attempt_at: None,
            original_inputs: None,
        },
        recovery_hints: None,
        dlq_created_at: Utc::now() - Duration::minutes(minutes_ago),
        dlq_created_by: "orchestrator".to_string(),
        severity: Severity::Low,
        recovery_priority: RecoveryPriority::Low,
        processing_attempts: 4,
        video_id: Some("dQw4w9WgXcQ".to_string()),
        video_ids: Vec::new(),
        target_channels: Vec::new(),
        estimated_quota_impact: None,
        estimated_cost_impact: None,
        target_platforms: Vec::new(),
    }
}

#[tokio::test]
async fn dlq_insert_is_idempotent() {
    let store = StateStore::open_in_memory().await.unwrap();
    let entry = dlq_entry("single_video_job-1_20250127_120000", JobType::SingleVideo, 5);
    assert_eq!(store.insert_dlq(&entry).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(
        store.insert_dlq(&entry).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn dlq_query_filters_and_orders_newest_first() {
    let store = StateStore::open_in_memory().await.unwrap();
    store
        .insert_dlq(&dlq_entry("a", JobType::SingleVideo, 10))
        .await
        .unwrap();
    store
        .insert_dlq(&dlq_entry("b", JobType::ChannelScrape, 5))
        .await
        .unwrap();
    store
        .insert_dlq(&dlq_entry("c", JobType::SingleVideo, 60 * 30))
        .await
        .unwrap();

    let recent = store
        .query_dlq(&DlqQuery {
            since: Some(Utc::now() - Duration::hours(24)),
            job_type: Some(JobType::SingleVideo),
            ..DlqQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].dlq_id, "a");

    let all_recent = store
        .query_dlq(&DlqQuery {
            since: Some(Utc::now() - Duration::hours(24)),
            ..DlqQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(all_recent.len(), 2);
    assert_eq!(all_recent[0].dlq_id, "b"); // newest first

    let by_video = store
        .query_dlq(&DlqQuery {
            video_id: Some("dQw4w9WgXcQ".to_string()),
            ..DlqQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_video.len(), 3);
}

#[tokio::test]
async fn checkpoints_round_trip() {
    let store = StateStore::open_in_memory().await.unwrap();
    let checkpoint = Checkpoint {
        service: "youtube_uploads".to_string(),
        scope: "UC123".to_string(),
        last_published_at: Some(Utc::now()),
        last_processed_id: Some("dQw4w9WgXcQ".to_string()),
        updated_at: Utc::now(),
    };
    store.upsert_checkpoint(&checkpoint).await.unwrap();

    let loaded = store
        .get_checkpoint("youtube_uploads", "UC123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.last_processed_id.as_deref(), Some("dQw4w9WgXcQ"));
    assert!(store.get_checkpoint("youtube_uploads", "UC999").await.unwrap().is_none());
}

#[tokio::test]
async fn quota_counters_accumulate_per_service_and_day() {
    let store = StateStore::open_in_memory().await.unwrap();
    let today = Utc::now().date_naive();
    store.add_quota_usage(today, "youtube", 100).await.unwrap();
    store.add_quota_usage(today, "youtube", 250).await.unwrap();
    store.add_quota_usage(today, "assemblyai", 2).await.unwrap();

    assert_eq!(store.get_quota_usage(today, "youtube").await.unwrap(), 350);
    assert_eq!(store.get_quota_usage(today, "assemblyai").await.unwrap(), 2);
    let yesterday = today.pred_opt().unwrap_or(today);
    assert_eq!(store.get_quota_usage(yesterday, "youtube").await.unwrap(), 0);
}

#[tokio::test]
async fn cost_ledger_accumulates_categories() {
    let store = StateStore::open_in_memory().await.unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
    store.add_cost(date, CostCategory::Transcription, 1.5).await.unwrap();
    store.add_cost(date, CostCategory::Llm, 0.25).await.unwrap();

    let costs = store.get_daily_costs(date).await.unwrap().unwrap();
    assert!((costs.transcription_usd - 1.5).abs() < 1e-9);
    assert!((costs.llm_usd - 0.25).abs() < 1e-9);
    assert!((costs.total_usd - 1.75).abs() < 1e-9);
}

#[tokio::test]
async fn audit_log_appends_and_queries_by_action() {
    let store = StateStore::open_in_memory().await.unwrap();
    let now = Utc::now();
    for (action, detail) in [
        ("job_dispatched", json!({"job_id": "a"})),
        ("llm_request", json!({"model": "gpt-4o", "total_tokens": 1500})),
        ("job_dispatched", json!({"job_id": "b"})),
    ] {
        store
            .append_audit(&AuditLogEntry {
                actor: "orchestrator".to_string(),
                action: action.to_string(),
                timestamp: now,
                details: detail,
            })
            .await
            .unwrap();
    }

    let window = (now - Duration::minutes(1), now + Duration::minutes(1));
    let dispatched = store
        .query_audit(window.0, window.1, Some("job_dispatched"))
        .await
        .unwrap();
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[0].details["job_id"], "a");

    let everything = store.query_audit(window.0, window.1, None).await.unwrap();
    assert_eq!(everything.len(), 3);
}
