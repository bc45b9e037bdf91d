// Identity helpers
// Video-ID extraction, deterministic artifact names, idempotency keys.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no YouTube video id found in: {0}")]
    InvalidVideoUrl(String),
}

// Covers full watch URLs (with extra query params in either order),
// short youtu.be links, embed URLs, and bare 11-character ids.
static WATCH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([A-Za-z0-9_-]{11})")
            .expect("watch pattern compiles"),
        Regex::new(r"youtube\.com/watch\?.*[&?]v=([A-Za-z0-9_-]{11})")
            .expect("query pattern compiles"),
        Regex::new(r"^([A-Za-z0-9_-]{11})$").expect("bare id pattern compiles"),
    ]
});

/// Extract the canonical 11-character video id from any supported URL shape.
pub fn extract_video_id(input: &str) -> Result<String, IdentityError> {
    let trimmed = input.trim();
    for pattern in WATCH_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(trimmed) {
            if let Some(id) = captures.get(1) {
                return Ok(id.as_str().to_string());
            }
        }
    }
    Err(IdentityError::InvalidVideoUrl(input.to_string()))
}

pub fn canonical_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// The four artifact flavors stored in Drive, each with a fixed extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    TranscriptTxt,
    TranscriptJson,
    SummaryMd,
    SummaryJson,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::TranscriptTxt => "transcript_txt",
            ArtifactKind::TranscriptJson => "transcript_json",
            ArtifactKind::SummaryMd => "summary_md",
            ArtifactKind::SummaryJson => "summary_json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::TranscriptTxt => "txt",
            ArtifactKind::TranscriptJson | ArtifactKind::SummaryJson => "json",
            ArtifactKind::SummaryMd => "md",
        }
    }
}

/// `{video_id}_{yyyy-mm-dd}_{type}.{ext}` — deterministic and injective on
/// its inputs.
pub fn artifact_filename(video_id: &str, date: NaiveDate, kind: ArtifactKind) -> String {
    format!(
        "{video_id}_{}_{}.{}",
        date.format("%Y-%m-%d"),
        kind.as_str(),
        kind.extension()
    )
}

/// `{video_id}:{operation}` — collapses duplicate work per video/operation.
pub fn idempotency_key(video_id: &str, operation: &str) -> String {
    format!("{video_id}:{operation}")
}
