use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a discovered video.
///
/// The status only ever moves forward along
/// `discovered -> transcription_queued -> transcribed -> summarized`;
/// `rejected_non_business` is a terminal sideways exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Discovered,
    TranscriptionQueued,
    Transcribed,
    Summarized,
    RejectedNonBusiness,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::Discovered => "discovered",
            VideoStatus::TranscriptionQueued => "transcription_queued",
            VideoStatus::Transcribed => "transcribed",
            VideoStatus::Summarized => "summarized",
            VideoStatus::RejectedNonBusiness => "rejected_non_business",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "discovered" => Some(VideoStatus::Discovered),
            "transcription_queued" => Some(VideoStatus::TranscriptionQueued),
            "transcribed" => Some(VideoStatus::Transcribed),
            "summarized" => Some(VideoStatus::Summarized),
            "rejected_non_business" => Some(VideoStatus::RejectedNonBusiness),
            _ => None,
        }
    }

    /// Position on the forward progression; `None` for the terminal rejection.
    pub fn rank(self) -> Option<u8> {
        match self {
            VideoStatus::Discovered => Some(0),
            VideoStatus::TranscriptionQueued => Some(1),
            VideoStatus::Transcribed => Some(2),
            VideoStatus::Summarized => Some(3),
            VideoStatus::RejectedNonBusiness => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VideoStatus::Summarized | VideoStatus::RejectedNonBusiness
        )
    }

    /// Whether the video has reached `target` (or progressed beyond it).
    pub fn is_at_least(self, target: VideoStatus) -> bool {
        match (self.rank(), target.rank()) {
            (Some(current), Some(wanted)) => current >= wanted,
            _ => false,
        }
    }

    /// Legal single-step transitions. Rejection is reachable from any
    /// non-terminal state; everything else advances exactly one rank.
    pub fn can_transition_to(self, next: VideoStatus) -> bool {
        if next == VideoStatus::RejectedNonBusiness {
            return !self.is_terminal();
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(wanted)) => wanted == current + 1,
            _ => false,
        }
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a video entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSource {
    Scrape,
    Sheet,
}

impl VideoSource {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoSource::Scrape => "scrape",
            VideoSource::Sheet => "sheet",
        }
    }
}

impl std::fmt::Display for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `videos/{video_id}` record. Created by discovery, advanced by the
/// orchestrator and the owning agent, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub duration_sec: u32,
    pub source: VideoSource,
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_doc_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zep_doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rag_refs: Vec<RagRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// The `transcripts/{video_id}` record. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub video_id: String,
    pub drive_id_txt: String,
    pub drive_id_json: String,
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub transcription_cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RagRefKind {
    TranscriptTxt,
    TranscriptJson,
    LogicDoc,
    ZepDoc,
}

impl RagRefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RagRefKind::TranscriptTxt => "transcript_txt",
            RagRefKind::TranscriptJson => "transcript_json",
            RagRefKind::LogicDoc => "logic_doc",
            RagRefKind::ZepDoc => "zep_doc",
        }
    }
}

/// Typed pointer to a retrieval artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagRef {
    pub kind: RagRefKind,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The `summaries/{video_id}` record with full downstream linkage.
/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub video_id: String,
    pub bullets: Vec<String>,
    pub key_concepts: Vec<String>,
    pub prompt_id: String,
    pub prompt_version: String,
    pub token_usage: TokenUsage,
    pub transcript_doc_ref: String,
    pub transcript_drive_id_txt: String,
    pub transcript_drive_id_json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zep_doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zep_collection: Option<String>,
    #[serde(default)]
    pub rag_refs: Vec<RagRef>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_progression_is_monotone() {
        assert!(VideoStatus::Discovered.can_transition_to(VideoStatus::TranscriptionQueued));
        assert!(VideoStatus::TranscriptionQueued.can_transition_to(VideoStatus::Transcribed));
        assert!(VideoStatus::Transcribed.can_transition_to(VideoStatus::Summarized));
        assert!(!VideoStatus::Transcribed.can_transition_to(VideoStatus::Discovered));
        assert!(!VideoStatus::Summarized.can_transition_to(VideoStatus::Transcribed));
        assert!(!VideoStatus::Discovered.can_transition_to(VideoStatus::Transcribed));
    }

    #[test]
    fn rejection_is_terminal_and_reachable_sideways() {
        assert!(VideoStatus::Discovered.can_transition_to(VideoStatus::RejectedNonBusiness));
        assert!(VideoStatus::Transcribed.can_transition_to(VideoStatus::RejectedNonBusiness));
        assert!(!VideoStatus::Summarized.can_transition_to(VideoStatus::RejectedNonBusiness));
        assert!(!VideoStatus::RejectedNonBusiness.can_transition_to(VideoStatus::Discovered));
        assert!(VideoStatus::RejectedNonBusiness.is_terminal());
    }

    #[test]
    fn is_at_least_ignores_rejected() {
        assert!(VideoStatus::Transcribed.is_at_least(VideoStatus::Discovered));
        assert!(!VideoStatus::Discovered.is_at_least(VideoStatus::Transcribed));
        assert!(!VideoStatus::RejectedNonBusiness.is_at_least(VideoStatus::Discovered));
    }

    #[test]
    fn status_serializes_snake_case() {
        let raw = serde_json::to_string(&VideoStatus::TranscriptionQueued).unwrap();
        assert_eq!(raw, "\"transcription_queued\"");
        assert_eq!(
            VideoStatus::parse("rejected_non_business"),
            Some(VideoStatus::RejectedNonBusiness)
        );
        assert_eq!(VideoStatus::parse("bogus"), None);
    }
}
