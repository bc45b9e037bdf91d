//! Notification channel adapters.
//!
//! Only Slack is wired today; the orchestrator talks to the
//! [`NotificationSink`] trait, so reports keep flowing through whatever
//! adapter is configured.

pub mod config;
pub mod slack;

pub use config::SlackConfig;
pub use slack::{NullSink, SlackSink};

pub use autopiloot_providers::NotificationSink;
