//! Summarization: generate business insights, handle the non-business
//! rejection path, index to the vector store, and commit the summary with
//! its back-references in one transaction.

use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use autopiloot_core::idempotency::{artifact_filename, ArtifactKind};
use autopiloot_core::time::date_for_filename;
use autopiloot_store::VideoTransitionExtra;
use autopiloot_types::{
    ErrorType, Platform, RagRef, RagRefKind, SummaryRecord, TokenUsage, VideoStatus,
};

use super::{RunFailure, Runners};

const SUMMARY_TASK: &str = "summarizer_generate_short";

impl Runners {
    pub(super) async fn run_summaries(
        &self,
        video_ids: &[String],
        platforms: Option<Vec<Platform>>,
    ) -> anyhow::Result<Value> {
        let platforms = platforms.unwrap_or_else(|| vec![Platform::Drive, Platform::Zep]);

        let mut summarized = 0u64;
        let mut rejected = 0u64;
        let mut already_done = 0u64;

        for video_id in video_ids {
            match self.summarize_one(video_id, &platforms).await? {
                SummaryOutcomeKind::Summarized => summarized += 1,
                SummaryOutcomeKind::RejectedNonBusiness => rejected += 1,
                SummaryOutcomeKind::AlreadyDone => already_done += 1,
            }
        }

        info!(summarized, rejected, already_done, "summary pass finished");
        Ok(json!({
            "videos_summarized": summarized,
            "videos_rejected_non_business": rejected,
            "videos_already_done": already_done,
        }))
    }

    async fn summarize_one(
        &self,
        video_id: &str,
        platforms: &[Platform],
    ) -> anyhow::Result<SummaryOutcomeKind> {
        let handles = &self.orchestrator.handles;

        let video = handles.store.get_video(video_id).await?.ok_or_else(|| {
            RunFailure::new(
                ErrorType::InvalidVideoId,
                format!("video {video_id} not found in the store"),
            )
        })?;

        match video.status {
            VideoStatus::Transcribed => {}
            VideoStatus::Summarized | VideoStatus::RejectedNonBusiness => {
                return Ok(SummaryOutcomeKind::AlreadyDone);
            }
            status => {
                return Err(RunFailure::new(
                    ErrorType::ValidationError,
                    format!("video {video_id} is {status}, expected transcribed"),
                ));
            }
        }

        let transcript = match handles.store.get_transcript(video_id).await? {
            Some(transcript) => transcript,
            None => {
                // Status says transcribed but the record is missing; that
                // is a broken invariant, not a transient failure.
                handles
                    .audit
                    .invariant_violation(&format!(
                        "video {video_id} is transcribed with no transcript record"
                    ))
                    .await;
                return Err(RunFailure::new(
                    ErrorType::DataCorruption,
                    format!("transcript record missing for {video_id}"),
                ));
            }
        };

        let transcript_text = self
            .collaborators
            .artifacts
            .fetch_text(&transcript.drive_id_txt)
            .await?;

        let started = Instant::now();
        let result = self
            .collaborators
            .summarization
            .summarize(&transcript_text, &video.title)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_llm_request(video_id, None, latency_ms, TokenUsage::default(), 0.0, false)
                    .await;
                return Err(err);
            }
        };

        let cost_usd = estimate_llm_cost(&outcome.model, outcome.token_usage);
        self.log_llm_request(
            video_id,
            Some(&outcome),
            latency_ms,
            outcome.token_usage,
            cost_usd,
            true,
        )
        .await;
        handles
            .store
            .add_cost(
                Utc::now().date_naive(),
                autopiloot_store::CostCategory::Llm,
                cost_usd,
            )
            .await?;

        if !outcome.is_business_content {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "not business content".to_string());
            let extra = VideoTransitionExtra {
                rejection_reason: Some(format!("{}: {reason}", outcome.content_type)),
                ..VideoTransitionExtra::default()
            };
            match handles
                .store
                .transition_video_status(
                    video_id,
                    VideoStatus::Transcribed,
                    VideoStatus::RejectedNonBusiness,
                    extra,
                )
                .await
            {
                Ok(_) => {}
                Err(err) if err.is_stale_state() => return Ok(SummaryOutcomeKind::AlreadyDone),
                Err(err) => return Err(err.into()),
            }
            handles
                .audit
                .video_rejected(video_id, &outcome.content_type, &reason)
                .await;
            debug!(video_id, content_type = %outcome.content_type, "rejected non-business video");
            return Ok(SummaryOutcomeKind::RejectedNonBusiness);
        }

        let date = date_for_filename(Some(video.published_at));
        let markdown = render_summary_markdown(&video.title, &outcome.bullets, &outcome.key_concepts);
        let short_drive_id = if platforms.contains(&Platform::Drive) {
            Some(
                self.collaborators
                    .artifacts
                    .store_text(
                        &artifact_filename(video_id, date, ArtifactKind::SummaryMd),
                        &markdown,
                    )
                    .await?,
            )
        } else {
            None
        };

        let mut zep_doc_id = None;
        let mut zep_collection = None;
        if platforms.contains(&Platform::Zep) {
            if let Some(index) = &self.collaborators.vector_index {
                let indexed = index
                    .upsert(
                        &format!("autopiloot_{video_id}_short"),
                        &markdown,
                        json!({
                            "video_id": video_id,
                            "title": video.title,
                            "prompt_id": outcome.prompt_id,
                        }),
                        &["short_summary".to_string()],
                    )
                    .await?;
                zep_collection = Some(indexed.collection);
                zep_doc_id = Some(indexed.doc_id);
            }
        }

        let mut rag_refs = vec![
            RagRef {
                kind: RagRefKind::TranscriptTxt,
                reference: transcript.drive_id_txt.clone(),
            },
            RagRef {
                kind: RagRefKind::TranscriptJson,
                reference: transcript.drive_id_json.clone(),
            },
        ];
        if let Some(doc_id) = &zep_doc_id {
            rag_refs.push(RagRef {
                kind: RagRefKind::ZepDoc,
                reference: doc_id.clone(),
            });
        }

        let summary = SummaryRecord {
            video_id: video_id.to_string(),
            bullets: outcome.bullets,
            key_concepts: outcome.key_concepts,
            prompt_id: outcome.prompt_id,
            prompt_version: outcome.prompt_version,
            token_usage: outcome.token_usage,
            transcript_doc_ref: format!("transcripts/{video_id}"),
            transcript_drive_id_txt: transcript.drive_id_txt,
            transcript_drive_id_json: transcript.drive_id_json,
            short_drive_id,
            zep_doc_id,
            zep_collection,
            rag_refs,
            created_at: Utc::now(),
        };

        match handles.store.complete_summary(&summary).await {
            Ok(_) => Ok(SummaryOutcomeKind::Summarized),
            Err(err) if err.is_stale_state() => Ok(SummaryOutcomeKind::AlreadyDone),
            Err(err) => Err(err.into()),
        }
    }

    async fn log_llm_request(
        &self,
        video_id: &str,
        outcome: Option<&autopiloot_providers::SummaryOutcome>,
        latency_ms: u64,
        usage: TokenUsage,
        cost_usd: f64,
        success: bool,
    ) {
        let config = &self.orchestrator.handles.config;
        let task = config.llm.resolve_task(SUMMARY_TASK);
        self.orchestrator
            .handles
            .audit
            .llm_request(json!({
                "video_id": video_id,
                "model": outcome.map(|o| o.model.clone()).unwrap_or(task.model),
                "task": SUMMARY_TASK,
                "prompt_id": outcome
                    .map(|o| o.prompt_id.clone())
                    .or(task.prompt_id)
                    .unwrap_or_else(|| "comprehensive_coach_v2".to_string()),
                "prompt_version": outcome
                    .map(|o| o.prompt_version.clone())
                    .or(task.prompt_version)
                    .unwrap_or_else(|| "v2".to_string()),
                "latency_ms": latency_ms,
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total_tokens,
                "cost_usd": cost_usd,
                "success": success,
            }))
            .await;
    }
}

enum SummaryOutcomeKind {
    Summarized,
    RejectedNonBusiness,
    AlreadyDone,
}

/// Dollar cost from published per-token rates; unknown models use the
/// flagship rate.
fn estimate_llm_cost(model: &str, usage: TokenUsage) -> f64 {
    let (input_per_million, output_per_million) = if model.starts_with("gpt-4o-mini") {
        (0.15, 0.60)
    } else {
        (2.50, 10.00)
    };
    usage.prompt_tokens as f64 / 1_000_000.0 * input_per_million
        + usage.completion_tokens as f64 / 1_000_000.0 * output_per_million
}

fn render_summary_markdown(title: &str, bullets: &[String], key_concepts: &[String]) -> String {
    let mut out = format!("# {title}\n\n## Actionable insights\n");
    for bullet in bullets {
        out.push_str(&format!("- {bullet}\n"));
    }
    out.push_str("\n## Key concepts\n");
    for concept in key_concepts {
        out.push_str(&format!("- {concept}\n"));
    }
    out
}
