//! Transcription: one video at a time, committed atomically with the
//! status advance and the cost-ledger increment.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use autopiloot_types::{ErrorType, TranscriptRecord, VideoStatus};

use super::{RunFailure, Runners};

impl Runners {
    pub(super) async fn run_transcriptions(&self, video_ids: &[String]) -> anyhow::Result<Value> {
        let handles = &self.orchestrator.handles;
        let max_duration = handles.config.idempotency.max_video_duration_sec;

        let mut transcribed = 0u64;
        let mut already_done = 0u64;
        let mut total_cost = 0.0f64;

        for video_id in video_ids {
            let video = handles.store.get_video(video_id).await?.ok_or_else(|| {
                RunFailure::new(
                    ErrorType::InvalidVideoId,
                    format!("video {video_id} not found in the store"),
                )
            })?;

            match video.status {
                VideoStatus::TranscriptionQueued => {}
                // Someone already carried this video forward; fine.
                status if status.is_at_least(VideoStatus::Transcribed) => {
                    already_done += 1;
                    continue;
                }
                VideoStatus::RejectedNonBusiness => {
                    already_done += 1;
                    continue;
                }
                status => {
                    return Err(RunFailure::new(
                        ErrorType::ValidationError,
                        format!("video {video_id} is {status}, expected transcription_queued"),
                    ));
                }
            }

            if video.duration_sec > max_duration {
                return Err(RunFailure::new(
                    ErrorType::VideoTooLong,
                    format!(
                        "video {video_id} is {}s, over the {max_duration}s ceiling",
                        video.duration_sec
                    ),
                ));
            }

            let result = self.collaborators.transcription.transcribe(&video.url).await?;

            let transcript = TranscriptRecord {
                video_id: video_id.clone(),
                drive_id_txt: result.drive_id_txt,
                drive_id_json: result.drive_id_json,
                digest: result.digest,
                created_at: Utc::now(),
                transcription_cost_usd: result.cost_usd,
            };

            match handles.store.complete_transcription(&transcript).await {
                Ok(_) => {
                    transcribed += 1;
                    total_cost += result.cost_usd;
                    handles
                        .store
                        .add_quota_usage(Utc::now().date_naive(), "assemblyai", 1)
                        .await?;
                    debug!(%video_id, cost_usd = result.cost_usd, "transcription committed");
                }
                // Lost the commit race to a concurrent worker; their
                // transcript stands and ours was never written.
                Err(err) if err.is_stale_state() => {
                    already_done += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(transcribed, already_done, "transcription pass finished");
        Ok(json!({
            "videos_transcribed": transcribed,
            "videos_already_done": already_done,
            "transcription_cost_usd": total_cost,
        }))
    }
}
