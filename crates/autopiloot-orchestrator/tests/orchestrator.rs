use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use autopiloot_core::config::AppConfig;
use autopiloot_orchestrator::agents::{Collaborators, JobRunOutcome, Runners};
use autopiloot_orchestrator::{
    CoreHandles, DispatchOutcome, DlqOutcome, DlqQueryRequest, DlqRequest, Orchestrator,
    PlanOverrides,
};
use autopiloot_providers::{
    ArtifactStore, ChannelSource, IndexedDoc, ProviderError, SheetSource, SummarizationService,
    SummaryOutcome, TranscriptionResult, TranscriptionService, UploadItem, VectorIndex,
};
use autopiloot_store::{CostCategory, StateStore};
use autopiloot_types::{
    Agent, ErrorType, FailureContext, JobInputs, JobType, PolicyOverrides, RecoveryPriority,
    Severity, TokenUsage, VideoStatus,
};

// ---------------------------------------------------------------------------
// Test doubles

struct FakeChannel {
    uploads: Vec<UploadItem>,
}

#[async_trait]
impl ChannelSource for FakeChannel {
    async fn resolve_handle(&self, _handle: &str) -> anyhow::Result<String> {
        Ok("UCfake000000000000000000".to_string())
    }

    async fn list_uploads(
        &self,
        _channel_id: &str,
        since: Option<DateTime<Utc>>,
        _until: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<UploadItem>> {
        let mut uploads: Vec<UploadItem> = self
            .uploads
            .iter()
            .filter(|item| since.map(|s| item.published_at > s).unwrap_or(true))
            .cloned()
            .collect();
        uploads.truncate(limit as usize);
        Ok(uploads)
    }

    async fn lookup_video(&self, video_id: &str) -> anyhow::Result<Option<UploadItem>> {
        Ok(self
            .uploads
            .iter()
            .find(|item| item.video_id == video_id)
            .cloned())
    }
}

struct FakeSheet {
    urls: Vec<String>,
}

#[async_trait]
impl SheetSource for FakeSheet {
    async fn read_video_urls(&self, _sheet_id: &str, _range: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.urls.clone())
    }
}

struct FakeTranscription {
    fail_with_timeout: bool,
}

#[async_trait]
impl TranscriptionService for FakeTranscription {
    async fn transcribe(&self, _video_url: &str) -> anyhow::Result<TranscriptionResult> {
        if self.fail_with_timeout {
            return Err(ProviderError::Timeout(std::time::Duration::from_secs(30)).into());
        }
        Ok(TranscriptionResult {
            drive_id_txt: "aai_fake_txt".to_string(),
            drive_id_json: "aai_fake_json".to_string(),
            digest: "deadbeef".to_string(),
            cost_usd: 0.4,
        })
    }
}

struct FakeSummarization {
    business: bool,
}

#[async_trait]
impl SummarizationService for FakeSummarization {
    async fn summarize(
        &self,
        _transcript_text: &str,
        _title: &str,
    ) -> anyhow::Result<SummaryOutcome> {
        if self.business {
            Ok(SummaryOutcome {
                bullets: vec!["Raise prices".to_string()],
                key_concepts: vec!["pricing power".to_string()],
                is_business_content: true,
                content_type: "Business Coaching".to_string(),
                reason: None,
                token_usage: TokenUsage::new(1200, 300),
                prompt_id: "coach_v2".to_string(),
                prompt_version: "v2".to_string(),
                model: "gpt-4o".to_string(),
            })
        } else {
            Ok(SummaryOutcome {
                bullets: Vec::new(),
                key_concepts: Vec::new(),
                is_business_content: false,
                content_type: "Song Lyrics".to_string(),
                reason: Some("music video".to_string()),
                token_usage: TokenUsage::new(800, 50),
                prompt_id: "coach_v2".to_string(),
                prompt_version: "v2".to_string(),
                model: "gpt-4o".to_string(),
            })
        }
    }
}

#[derive(Default)]
struct RecordingIndex {
    upserts: Mutex<Vec<String>>,
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(
        &self,
        doc_id: &str,
        _content: &str,
        _metadata: Value,
        _labels: &[String],
    ) -> anyhow::Result<IndexedDoc> {
        self.upserts.lock().unwrap().push(doc_id.to_string());
        Ok(IndexedDoc {
            doc_id: doc_id.to_string(),
            collection: "autopiloot_guidelines".to_string(),
        })
    }
}

#[derive(Default)]
struct MemoryArtifacts {
    blobs: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn fetch_text(&self, artifact_id: &str) -> anyhow::Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no artifact {artifact_id}"))
    }

    async fn store_text(&self, name: &str, content: &str) -> anyhow::Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_string());
        Ok(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// Harness

struct Harness {
    store: Arc<StateStore>,
    orchestrator: Arc<Orchestrator>,
}

async fn harness(config: AppConfig) -> Harness {
    let store = Arc::new(StateStore::open_in_memory().await.unwrap());
    let orchestrator = Arc::new(Orchestrator::new(CoreHandles::new(
        store.clone(),
        Arc::new(config),
    )));
    Harness {
        store,
        orchestrator,
    }
}

fn upload(video_id: &str, minutes_ago: i64, duration_sec: u32) -> UploadItem {
    UploadItem {
        video_id: video_id.to_string(),
        title: format!("Video {video_id}"),
        published_at: Utc::now() - Duration::minutes(minutes_ago),
        duration_sec,
    }
}

fn runners(
    harness: &Harness,
    channel: FakeChannel,
    sheet: Option<FakeSheet>,
    transcription: FakeTranscription,
    summarization: FakeSummarization,
    index: Arc<RecordingIndex>,
    artifacts: Arc<MemoryArtifacts>,
) -> Runners {
    Runners::new(
        harness.orchestrator.clone(),
        Collaborators {
            channel_source: Arc::new(channel),
            sheet_source: sheet.map(|s| Arc::new(s) as Arc<dyn SheetSource>),
            transcription: Arc::new(transcription),
            summarization: Arc::new(summarization),
            vector_index: Some(index),
            artifacts,
        },
    )
}

async fn audit_actions(store: &StateStore, action: &str) -> usize {
    store
        .query_audit(
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
            Some(action),
        )
        .await
        .unwrap()
        .len()
}

// ---------------------------------------------------------------------------
// Dispatch scenarios

#[tokio::test]
async fn duplicate_dispatch_keeps_a_single_job() {
    let h = harness(AppConfig::default()).await;
    let inputs = JobInputs::ChannelScrape {
        channels: vec!["@AlexHormozi".to_string()],
        limit_per_channel: Some(10),
    };

    let first = h
        .orchestrator
        .dispatch(inputs.clone(), PolicyOverrides::default())
        .await
        .unwrap();
    let job_id = match &first {
        DispatchOutcome::Dispatched { job_id, .. } => job_id.clone(),
        other => panic!("expected dispatched, got {other:?}"),
    };

    // Same second, same id: the second call collapses into the first.
    let second = h
        .orchestrator
        .dispatch(inputs, PolicyOverrides::default())
        .await
        .unwrap();
    match second {
        DispatchOutcome::AlreadyExists { job_ref } => assert!(job_ref.contains(&job_id)),
        // A second boundary between the calls produces a distinct id; both
        // records are then legitimate.
        DispatchOutcome::Dispatched { job_id: other, .. } => assert_ne!(other, job_id),
        other => panic!("unexpected outcome {other:?}"),
    }

    let jobs = h.store.list_active_jobs(Agent::Scraper).await.unwrap();
    assert!(!jobs.is_empty());
    assert_eq!(audit_actions(&h.store, "job_dispatched").await, jobs.len());
}

#[tokio::test]
async fn transcription_dispatch_respects_the_budget_gate() {
    let h = harness(AppConfig::default()).await; // $5 daily budget
    h.store
        .add_cost(Utc::now().date_naive(), CostCategory::Transcription, 4.80)
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .dispatch(
            JobInputs::BatchTranscribe {
                video_ids: vec!["videoAAAAAA".to_string(), "videoBBBBBB".to_string()],
                batch_size: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Rejected { reason } => {
            assert!(reason.contains("budget_limit_usd exceeded"), "reason: {reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    assert!(h
        .store
        .list_active_jobs(Agent::Transcriber)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(audit_actions(&h.store, "job_dispatch_rejected").await, 1);
}

#[tokio::test]
async fn discovery_dispatch_throttles_at_the_quota_threshold() {
    let h = harness(AppConfig::default()).await;
    h.store
        .add_quota_usage(Utc::now().date_naive(), "youtube", 9_500)
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@AlexHormozi".to_string()],
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Rejected { reason } => {
            assert!(reason.contains("quota threshold exceeded"), "reason: {reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_channel_list_fails_validation_without_writes() {
    let h = harness(AppConfig::default()).await;
    let err = h
        .orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: Vec::new(),
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("validation failed"));
    assert!(h
        .store
        .list_active_jobs(Agent::Scraper)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn dispatch_collapses_into_the_existing_per_video_job() {
    let h = harness(AppConfig::default()).await;
    let existing = autopiloot_types::JobRecord {
        job_id: "single_video_busyVideo001".to_string(),
        inputs: JobInputs::SingleVideo {
            video_id: "busyVideo001".to_string(),
            priority: None,
        },
        policy_overrides: PolicyOverrides::default(),
        status: autopiloot_types::JobStatus::Pending,
        retry_count: 0,
        priority: autopiloot_types::JobPriority::Medium,
        created_at: Utc::now(),
        created_by: "orchestrator".to_string(),
        last_attempt_at: None,
        last_error_type: None,
        estimated_quota_units: None,
        estimated_cost_usd: Some(0.5),
        estimated_output_tokens: None,
    };
    h.store.insert_job(&existing).await.unwrap();

    let outcome = h
        .orchestrator
        .dispatch(
            JobInputs::BatchTranscribe {
                video_ids: vec!["busyVideo001".to_string(), "otherVideo02".to_string()],
                batch_size: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::AlreadyExists { job_ref } => {
            assert!(job_ref.ends_with("single_video_busyVideo001"));
        }
        other => panic!("expected already_exists, got {other:?}"),
    }
    // Only the pre-existing job remains active.
    assert_eq!(
        h.store.list_active_jobs(Agent::Transcriber).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn summary_dispatch_requires_transcribed_videos() {
    let h = harness(AppConfig::default()).await;
    let outcome = h
        .orchestrator
        .dispatch(
            JobInputs::SingleSummary {
                video_id: "missing00001".to_string(),
                platforms: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    match outcome {
        DispatchOutcome::Rejected { reason } => {
            assert!(reason.contains("prerequisites not met"), "reason: {reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// DLQ scenarios

#[tokio::test]
async fn terminal_auth_failure_routes_urgently_and_clears_the_job() {
    let h = harness(AppConfig::default()).await;

    // Stage an active scrape job that then hit an authorization wall.
    let dispatched = h
        .orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@AlexHormozi".to_string()],
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    let job_id = match dispatched {
        DispatchOutcome::Dispatched { job_id, .. } => job_id,
        other => panic!("expected dispatched, got {other:?}"),
    };

    let outcome = h
        .orchestrator
        .handle_dlq(DlqRequest {
            job_id: job_id.clone(),
            job_type: JobType::ChannelScrape,
            failure_context: FailureContext {
                error_type: ErrorType::AuthorizationFailed,
                error_message: "API key invalid".to_string(),
                retry_count: 0,
                last_attempt_at: Some(Utc::now()),
                original_inputs: Some(JobInputs::ChannelScrape {
                    channels: vec!["@AlexHormozi".to_string()],
                    limit_per_channel: None,
                }),
            },
            recovery_hints: None,
        })
        .await
        .unwrap();

    match outcome {
        DlqOutcome::Routed {
            severity,
            recovery_priority,
            processing_attempts,
            dlq_id,
            ..
        } => {
            assert_eq!(severity, Severity::High);
            assert_eq!(recovery_priority, RecoveryPriority::Urgent);
            assert_eq!(processing_attempts, 1);
            let entry = h.store.get_dlq(&dlq_id).await.unwrap().unwrap();
            assert_eq!(entry.target_channels, vec!["@AlexHormozi".to_string()]);
        }
        other => panic!("expected routed, got {other:?}"),
    }

    // Invariant: DLQ entry and active job never coexist.
    assert!(h
        .store
        .get_job(Agent::Scraper, &job_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(audit_actions(&h.store, "job_dlq_routed").await, 1);
}

#[tokio::test]
async fn dlq_query_filters_and_aggregates() {
    let h = harness(AppConfig::default()).await;
    for (job_id, error_type) in [
        ("job_a", ErrorType::ApiTimeout),
        ("job_b", ErrorType::ApiTimeout),
        ("job_c", ErrorType::QuotaExceeded),
    ] {
        h.orchestrator
            .handle_dlq(DlqRequest {
                job_id: job_id.to_string(),
                job_type: JobType::SingleVideo,
                failure_context: FailureContext {
                    error_type,
                    error_message: format!("{error_type}"),
                    retry_count: 3,
                    last_attempt_at: None,
                    original_inputs: Some(JobInputs::SingleVideo {
                        video_id: format!("video_{job_id}"),
                        priority: None,
                    }),
                },
                recovery_hints: None,
            })
            .await
            .unwrap();
    }

    let result = h
        .orchestrator
        .query_dlq(&DlqQueryRequest::default())
        .await
        .unwrap();
    assert_eq!(result.entries.len(), 3);
    let stats = result.statistics.unwrap();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.by_error_type["api_timeout"], 2);
    assert_eq!(stats.top_error_patterns[0].0, "api_timeout");
    assert!((stats.average_processing_attempts - 4.0).abs() < 1e-9);

    let filtered = h
        .orchestrator
        .query_dlq(&DlqQueryRequest {
            video_id: Some("video_job_c".to_string()),
            ..DlqQueryRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.entries.len(), 1);
    assert_eq!(
        filtered.entries[0].failure_context.error_type,
        ErrorType::QuotaExceeded
    );
}

// ---------------------------------------------------------------------------
// End-to-end pipeline

#[tokio::test]
async fn full_pipeline_discovers_transcribes_and_summarizes() {
    let h = harness(AppConfig::default()).await;
    let index = Arc::new(RecordingIndex::default());
    let artifacts = Arc::new(MemoryArtifacts::default());
    artifacts
        .store_text("aai_fake_txt", "the full transcript text")
        .await
        .unwrap();

    let runners = runners(
        &h,
        FakeChannel {
            uploads: vec![
                upload("shortVideo1", 30, 1800),
                upload("edgeVideo001", 25, 4200), // exactly at the ceiling
                upload("longVideo01", 20, 4201),  // one second over
            ],
        },
        None,
        FakeTranscription {
            fail_with_timeout: false,
        },
        FakeSummarization { business: true },
        index.clone(),
        artifacts,
    );

    // Discovery.
    h.orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@AlexHormozi".to_string()],
                limit_per_channel: Some(10),
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    let stats = runners.run_pending(Agent::Scraper).await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let short = h.store.get_video("shortVideo1").await.unwrap().unwrap();
    assert_eq!(short.status, VideoStatus::TranscriptionQueued);
    // Exactly at the 4200s ceiling: accepted.
    let edge = h.store.get_video("edgeVideo001").await.unwrap().unwrap();
    assert_eq!(edge.status, VideoStatus::TranscriptionQueued);
    // One second over: left as discovered.
    let long = h.store.get_video("longVideo01").await.unwrap().unwrap();
    assert_eq!(long.status, VideoStatus::Discovered);

    // Transcription.
    let stats = runners.run_pending(Agent::Transcriber).await.unwrap();
    assert_eq!(stats.succeeded, 2);
    let video = h.store.get_video("shortVideo1").await.unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::Transcribed);
    let transcript = h.store.get_transcript("shortVideo1").await.unwrap().unwrap();
    assert_eq!(transcript.digest, "deadbeef");
    let costs = h
        .store
        .get_daily_costs(Utc::now().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!(costs.transcription_usd > 0.0);

    // Summarization.
    h.orchestrator
        .dispatch(
            JobInputs::SingleSummary {
                video_id: "shortVideo1".to_string(),
                platforms: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    let stats = runners.run_pending(Agent::Summarizer).await.unwrap();
    assert_eq!(stats.succeeded, 1);

    let video = h.store.get_video("shortVideo1").await.unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::Summarized);
    assert_eq!(video.summary_doc_ref.as_deref(), Some("summaries/shortVideo1"));
    assert!(video.zep_doc_id.is_some());

    let summary = h.store.get_summary("shortVideo1").await.unwrap().unwrap();
    assert_eq!(summary.bullets, vec!["Raise prices".to_string()]);
    assert!(!summary.rag_refs.is_empty());

    assert_eq!(
        index.upserts.lock().unwrap().as_slice(),
        ["autopiloot_shortVideo1_short"]
    );

    // All queues drained.
    assert!(h.store.list_active_jobs(Agent::Scraper).await.unwrap().is_empty());
    assert!(h.store.list_active_jobs(Agent::Transcriber).await.unwrap().is_empty());
    assert!(h.store.list_active_jobs(Agent::Summarizer).await.unwrap().is_empty());
}

#[tokio::test]
async fn non_business_content_is_rejected_without_side_effects() {
    let h = harness(AppConfig::default()).await;
    let index = Arc::new(RecordingIndex::default());
    let artifacts = Arc::new(MemoryArtifacts::default());
    artifacts
        .store_text("aai_fake_txt", "never gonna give you up")
        .await
        .unwrap();

    let runners = runners(
        &h,
        FakeChannel {
            uploads: vec![upload("musicVideo1", 30, 213)],
        },
        None,
        FakeTranscription {
            fail_with_timeout: false,
        },
        FakeSummarization { business: false },
        index.clone(),
        artifacts,
    );

    h.orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@RickAstley".to_string()],
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    runners.run_pending(Agent::Scraper).await.unwrap();
    runners.run_pending(Agent::Transcriber).await.unwrap();

    h.orchestrator
        .dispatch(
            JobInputs::SingleSummary {
                video_id: "musicVideo1".to_string(),
                platforms: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    let stats = runners.run_pending(Agent::Summarizer).await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.dlq_routed, 0);

    let video = h.store.get_video("musicVideo1").await.unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::RejectedNonBusiness);
    assert!(video.rejection_reason.as_deref().unwrap().contains("Song Lyrics"));

    // No summary, no vector write, no DLQ entry; one rejection audit entry.
    assert!(h.store.get_summary("musicVideo1").await.unwrap().is_none());
    assert!(index.upserts.lock().unwrap().is_empty());
    assert_eq!(h.store.count_dlq_since(Utc::now() - Duration::hours(1)).await.unwrap(), 0);
    assert_eq!(audit_actions(&h.store, "video_rejected_non_business").await, 1);
}

#[tokio::test]
async fn exhausted_transcription_retries_land_in_the_dlq() {
    let mut config = AppConfig::default();
    config.reliability.retry.max_attempts = 1;
    let h = harness(config).await;
    let index = Arc::new(RecordingIndex::default());
    let artifacts = Arc::new(MemoryArtifacts::default());

    let runners = runners(
        &h,
        FakeChannel {
            uploads: vec![upload("flakyVideo01", 30, 900)],
        },
        None,
        FakeTranscription {
            fail_with_timeout: true,
        },
        FakeSummarization { business: true },
        index,
        artifacts,
    );

    h.orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@AlexHormozi".to_string()],
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    runners.run_pending(Agent::Scraper).await.unwrap();

    let stats = runners.run_pending(Agent::Transcriber).await.unwrap();
    assert_eq!(stats.dlq_routed, 1);

    // The job is gone and the failure is classified as an api_timeout.
    assert!(h
        .store
        .list_active_jobs(Agent::Transcriber)
        .await
        .unwrap()
        .is_empty());
    let entries = h
        .store
        .query_dlq(&autopiloot_store::DlqQuery::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].failure_context.error_type, ErrorType::ApiTimeout);
    assert_eq!(entries[0].video_id.as_deref(), Some("flakyVideo01"));

    // The video stays queued for a manual or next-day recovery.
    let video = h.store.get_video("flakyVideo01").await.unwrap().unwrap();
    assert_eq!(video.status, VideoStatus::TranscriptionQueued);
}

#[tokio::test]
async fn transient_failure_defers_until_backoff_expires() {
    let h = harness(AppConfig::default()).await; // max_attempts 3
    let index = Arc::new(RecordingIndex::default());
    let artifacts = Arc::new(MemoryArtifacts::default());

    let runners = runners(
        &h,
        FakeChannel {
            uploads: vec![upload("retryVideo01", 30, 900)],
        },
        None,
        FakeTranscription {
            fail_with_timeout: true,
        },
        FakeSummarization { business: true },
        index,
        artifacts,
    );

    h.orchestrator
        .dispatch(
            JobInputs::ChannelScrape {
                channels: vec!["@AlexHormozi".to_string()],
                limit_per_channel: None,
            },
            PolicyOverrides::default(),
        )
        .await
        .unwrap();
    runners.run_pending(Agent::Scraper).await.unwrap();

    // First pass fails transiently and schedules a retry.
    let stats = runners.run_pending(Agent::Transcriber).await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.dlq_routed, 0);

    let jobs = h.store.list_active_jobs(Agent::Transcriber).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].retry_count, 1);
    assert_eq!(jobs[0].last_error_type, Some(ErrorType::ApiTimeout));

    // Second pass arrives inside the backoff window and is deferred.
    let jobs_before = h.store.list_active_jobs(Agent::Transcriber).await.unwrap();
    let outcome = runners.run_job(&jobs_before[0]).await.unwrap();
    match outcome {
        JobRunOutcome::Deferred { delay_sec, reason } => {
            assert!(delay_sec <= 120);
            assert!(reason.contains("backoff unsatisfied"));
        }
        other => panic!("expected deferred, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Planning and reporting

#[tokio::test]
async fn daily_plan_reflects_config_and_flags_overcommit() {
    let config = AppConfig::from_yaml_str(
        r#"
scraper:
  handles: ["@a", "@b", "@c"]
  daily_limit_per_channel: 50
reliability:
  quotas:
    assemblyai_daily_limit: 100
"#,
    )
    .unwrap();
    let h = harness(config).await;

    let plan = h
        .orchestrator
        .plan_daily_run(PlanOverrides::default())
        .await
        .unwrap();
    assert_eq!(plan.channels.len(), 3);
    assert_eq!(plan.per_channel_limit, 50);
    assert_eq!(plan.total_videos_planned, 150);
    assert_eq!(plan.operational_status, "planned");
    // 150 planned > 100 assemblyai limit.
    assert!(plan
        .warnings
        .iter()
        .any(|w| w.contains("exceed AssemblyAI daily limit")));

    let overridden = h
        .orchestrator
        .plan_daily_run(PlanOverrides {
            target_channels: Some(vec!["@solo".to_string()]),
            max_videos_per_channel: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(overridden.channels, vec!["@solo".to_string()]);
    assert_eq!(overridden.total_videos_planned, 2);
    assert!(overridden.warnings.is_empty());
}

#[tokio::test]
async fn plan_offers_budget_exceeded_jobs_for_reenqueue() {
    let h = harness(AppConfig::default()).await;
    h.orchestrator
        .handle_dlq(DlqRequest {
            job_id: "batch_transcribe_20250126_020000".to_string(),
            job_type: JobType::BatchTranscribe,
            failure_context: FailureContext {
                error_type: ErrorType::BudgetExceeded,
                error_message: "budget exceeded".to_string(),
                retry_count: 0,
                last_attempt_at: None,
                original_inputs: None,
            },
            recovery_hints: None,
        })
        .await
        .unwrap();

    let plan = h
        .orchestrator
        .plan_daily_run(PlanOverrides::default())
        .await
        .unwrap();
    assert_eq!(
        plan.reenqueue_candidates,
        vec!["batch_transcribe_20250126_020000".to_string()]
    );
}
