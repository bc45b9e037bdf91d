pub mod dlq;
pub mod job;
pub mod ops;
pub mod video;

pub use dlq::{DlqEntry, ErrorType, FailureContext, RecoveryHints, RecoveryPriority, Severity};
pub use job::{
    Agent, JobInputs, JobPriority, JobRecord, JobStatus, JobType, Platform, PolicyOverrides,
};
pub use ops::{AlertLevel, AuditLogEntry, Checkpoint, DailyCosts, RunContext, RunSummary};
pub use video::{
    RagRef, RagRefKind, SummaryRecord, TokenUsage, TranscriptRecord, VideoRecord, VideoSource,
    VideoStatus,
};
