pub mod config;
pub mod env;
pub mod idempotency;
pub mod time;

pub use config::{AppConfig, ConfigError};
pub use env::EnvError;
pub use idempotency::{
    artifact_filename, canonical_watch_url, extract_video_id, idempotency_key, ArtifactKind,
    IdentityError,
};
pub use time::TimeError;
