//! The orchestration core: daily planning, agent dispatch, job execution,
//! dead-letter routing, and operational event emission. Every
//! state-affecting operation funnels through [`Orchestrator`] and its
//! [`AuditLogger`].

pub mod agents;
pub mod audit;
pub mod dispatch;
pub mod dlq;
pub mod error;
pub mod events;
pub mod planner;

use std::sync::Arc;

use autopiloot_core::config::AppConfig;
use autopiloot_policy::PolicyLimits;
use autopiloot_store::StateStore;

pub use audit::AuditLogger;
pub use dispatch::{DispatchOutcome, Orchestrator};
pub use dlq::{DlqOutcome, DlqQueryRequest, DlqQueryResult, DlqRequest, DlqStatistics};
pub use error::OrchestratorError;
pub use events::{OperationalInsights, RunEventReport};
pub use planner::{DailyPlan, PlanOverrides};

/// Build policy limits from the loaded configuration.
pub fn policy_limits(config: &AppConfig) -> PolicyLimits {
    PolicyLimits {
        max_attempts: config.reliability.retry.max_attempts,
        base_delay_sec: config.reliability.retry.base_delay_sec,
        youtube_daily_limit: config.reliability.quotas.youtube_daily_limit,
        assemblyai_daily_limit: config.reliability.quotas.assemblyai_daily_limit,
        transcription_daily_budget_usd: config.budgets.transcription_daily_usd,
    }
}

/// Shared handle bundle used by dispatchers and runners.
#[derive(Clone)]
pub struct CoreHandles {
    pub store: Arc<StateStore>,
    pub config: Arc<AppConfig>,
    pub audit: AuditLogger,
}

impl CoreHandles {
    pub fn new(store: Arc<StateStore>, config: Arc<AppConfig>) -> Self {
        let audit = AuditLogger::new(store.clone());
        Self {
            store,
            config,
            audit,
        }
    }
}
