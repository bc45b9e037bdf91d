use thiserror::Error;

use autopiloot_store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bad dispatch inputs; nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(#[from] autopiloot_core::ConfigError),

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
