use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use autopiloot_channels::{NullSink, SlackConfig, SlackSink};
use autopiloot_core::config::AppConfig;
use autopiloot_core::env;
use autopiloot_observability::{
    analyze_dlq_trends, build_daily_summary, collect_llm_metrics, init_process_logging,
    DailySummaryInputs, ProcessKind, QuotaSnapshot, TrendOptions,
};
use autopiloot_orchestrator::agents::{Collaborators, Runners, RunStats};
use autopiloot_orchestrator::{
    CoreHandles, DlqQueryRequest, Orchestrator, PlanOverrides,
};
use autopiloot_providers::{
    assemblyai::AssemblyAiClient, local::LocalArtifacts, openai::OpenAiSummarizer,
    sheets::GoogleSheets, youtube::YouTubeDataApi, zep::ZepIndex, NotificationSink, VectorIndex,
};
use autopiloot_store::{DlqQuery, StateStore};
use autopiloot_types::{
    Agent, AlertLevel, JobInputs, JobPriority, JobType, Platform, PolicyOverrides, RunContext,
    RunSummary, Severity,
};

#[derive(Parser, Debug)]
#[command(name = "autopiloot-engine")]
#[command(about = "Autopiloot content pipeline orchestrator")]
struct Cli {
    /// Directory holding the state database, artifacts, and logs.
    #[arg(long, env = "AUTOPILOOT_STATE_DIR")]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate required environment variables and credentials.
    CheckEnv,
    /// Compute today's processing plan (no side effects).
    Plan {
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Dispatch a work order to an agent queue.
    Dispatch {
        #[command(subcommand)]
        job: DispatchJob,
    },
    /// Execute pending jobs for one agent, or the full daily sequence.
    Run {
        #[arg(long, default_value = "all")]
        agent: String,
    },
    /// Inspect or analyze the dead-letter queue.
    Dlq {
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long)]
        job_type: Option<String>,
        #[arg(long)]
        video_id: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = false)]
        no_stats: bool,
    },
    /// Operational reports.
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
}

#[derive(Subcommand, Debug)]
enum DispatchJob {
    Scrape {
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Sheet {
        #[arg(long)]
        sheet_id: String,
        #[arg(long)]
        range: Option<String>,
    },
    Transcribe {
        #[arg(long, value_delimiter = ',')]
        video_ids: Vec<String>,
        #[arg(long)]
        batch_size: Option<u32>,
        #[arg(long)]
        budget_limit_usd: Option<f64>,
    },
    Summarize {
        #[arg(long, value_delimiter = ',')]
        video_ids: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        platforms: Option<Vec<String>>,
    },
}

#[derive(Subcommand, Debug)]
enum ReportKind {
    Daily {
        /// Target date (YYYY-MM-DD); defaults to yesterday UTC.
        #[arg(long)]
        date: Option<String>,
        /// Post the report to the notification channel.
        #[arg(long, default_value_t = false)]
        deliver: bool,
    },
    Trends {
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 2.0)]
        spike_threshold: f64,
        #[arg(long, default_value_t = false)]
        no_recommendations: bool,
    },
    Llm {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

struct EngineState {
    store: Arc<StateStore>,
    config: Arc<AppConfig>,
    orchestrator: Arc<Orchestrator>,
    state_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let state_dir = resolve_state_dir(cli.state_dir);

    let (_guard, _info) =
        init_process_logging(ProcessKind::Engine, &state_dir.join("logs"), 14)?;

    match cli.command {
        Command::CheckEnv => check_env(),
        Command::Plan { channels, limit } => {
            let state = build_state(&state_dir).await?;
            let plan = state
                .orchestrator
                .plan_daily_run(PlanOverrides {
                    target_channels: channels,
                    max_videos_per_channel: limit,
                })
                .await?;
            print_json(&plan)
        }
        Command::Dispatch { job } => {
            let state = build_state(&state_dir).await?;
            let (inputs, overrides) = dispatch_inputs(job)?;
            let outcome = state.orchestrator.dispatch(inputs, overrides).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            Ok(())
        }
        Command::Run { agent } => run_agents(&state_dir, &agent).await,
        Command::Dlq {
            hours,
            job_type,
            video_id,
            severity,
            limit,
            no_stats,
        } => {
            let state = build_state(&state_dir).await?;
            let request = DlqQueryRequest {
                hours,
                job_type: parse_job_type(job_type.as_deref())?,
                video_id,
                severity: parse_severity(severity.as_deref())?,
                limit,
                include_statistics: !no_stats,
            };
            let result = state.orchestrator.query_dlq(&request).await?;
            print_json(&json!({
                "query_executed_at": Utc::now(),
                "entries_count": result.entries.len(),
                "entries": result.entries,
                "statistics": result.statistics,
            }))
        }
        Command::Report { report } => run_report(&state_dir, report).await,
    }
}

fn resolve_state_dir(explicit: Option<String>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("autopiloot_state"))
}

async fn build_state(state_dir: &Path) -> anyhow::Result<EngineState> {
    std::fs::create_dir_all(state_dir)?;
    let store = Arc::new(StateStore::open(&state_dir.join("state.db")).await?);

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "settings.yaml not loaded; using defaults");
            AppConfig::default()
        }
    };
    let config = Arc::new(config);

    let orchestrator = Arc::new(Orchestrator::new(CoreHandles::new(
        store.clone(),
        config.clone(),
    )));

    Ok(EngineState {
        store,
        config,
        orchestrator,
        state_dir: state_dir.to_path_buf(),
    })
}

fn check_env() -> anyhow::Result<()> {
    let resolved = env::validate_required_environment()
        .context("required environment is incomplete")?;
    for (name, _) in &resolved {
        println!("{name}: ok");
    }
    for (name, configured) in env::optional_integrations() {
        println!(
            "{name}: {}",
            if configured { "ok" } else { "not configured (optional)" }
        );
    }
    Ok(())
}

fn dispatch_inputs(job: DispatchJob) -> anyhow::Result<(JobInputs, PolicyOverrides)> {
    match job {
        DispatchJob::Scrape { channels, limit } => Ok((
            JobInputs::ChannelScrape {
                channels,
                limit_per_channel: limit,
            },
            PolicyOverrides::default(),
        )),
        DispatchJob::Sheet { sheet_id, range } => Ok((
            JobInputs::SheetBackfill { sheet_id, range },
            PolicyOverrides::default(),
        )),
        DispatchJob::Transcribe {
            video_ids,
            batch_size,
            budget_limit_usd,
        } => {
            let overrides = PolicyOverrides {
                budget_limit_usd,
                ..PolicyOverrides::default()
            };
            let inputs = if video_ids.len() == 1 {
                JobInputs::SingleVideo {
                    video_id: video_ids.into_iter().next().unwrap_or_default(),
                    priority: Some(JobPriority::Medium),
                }
            } else {
                JobInputs::BatchTranscribe {
                    video_ids,
                    batch_size,
                }
            };
            Ok((inputs, overrides))
        }
        DispatchJob::Summarize {
            video_ids,
            platforms,
        } => {
            let platforms = platforms
                .map(|raw| {
                    raw.iter()
                        .map(|p| match p.as_str() {
                            "drive" => Ok(Platform::Drive),
                            "zep" => Ok(Platform::Zep),
                            "slack" => Ok(Platform::Slack),
                            other => Err(anyhow::anyhow!("unknown platform: {other}")),
                        })
                        .collect::<anyhow::Result<Vec<_>>>()
                })
                .transpose()?;
            let inputs = if video_ids.len() == 1 {
                JobInputs::SingleSummary {
                    video_id: video_ids.into_iter().next().unwrap_or_default(),
                    platforms,
                }
            } else {
                JobInputs::BatchSummarize {
                    video_ids,
                    prompt_override: None,
                }
            };
            Ok((inputs, PolicyOverrides::default()))
        }
    }
}

fn build_runners(state: &EngineState) -> anyhow::Result<Runners> {
    let youtube_key =
        env::get_required_var("YOUTUBE_API_KEY", "YouTube Data API key for discovery")?;
    let assemblyai_key =
        env::get_required_var("ASSEMBLYAI_API_KEY", "AssemblyAI key for transcription")?;
    let openai_key = env::get_required_var("OPENAI_API_KEY", "OpenAI key for summaries")?;

    let task = state.config.llm.resolve_task("summarizer_generate_short");
    let vector_index: Option<Arc<dyn VectorIndex>> =
        match env::get_optional_var("ZEP_API_KEY", "") {
            key if key.is_empty() => None,
            key => Some(Arc::new(ZepIndex::new(key))),
        };

    let collaborators = Collaborators {
        channel_source: Arc::new(YouTubeDataApi::new(youtube_key.clone())),
        sheet_source: Some(Arc::new(GoogleSheets::new(youtube_key))),
        transcription: Arc::new(AssemblyAiClient::new(assemblyai_key)),
        summarization: Arc::new(OpenAiSummarizer::new(openai_key, task)),
        vector_index,
        artifacts: Arc::new(LocalArtifacts::new(state.state_dir.join("artifacts"))),
    };

    Ok(Runners::new(state.orchestrator.clone(), collaborators))
}

fn build_sink(config: &AppConfig) -> Arc<dyn NotificationSink> {
    match SlackConfig::from_env(&config.notifications.slack.channel) {
        Ok(slack) => Arc::new(SlackSink::new(slack)),
        Err(err) => {
            info!(%err, "notification delivery disabled");
            Arc::new(NullSink)
        }
    }
}

async fn run_agents(state_dir: &Path, agent: &str) -> anyhow::Result<()> {
    let state = build_state(state_dir).await?;
    let runners = build_runners(&state)?;
    let started_at = Utc::now();

    // Discovery before transcription before summarization within a run.
    let agents: Vec<Agent> = match agent {
        "all" => vec![Agent::Scraper, Agent::Transcriber, Agent::Summarizer],
        "scraper" => vec![Agent::Scraper],
        "transcriber" => vec![Agent::Transcriber],
        "summarizer" => vec![Agent::Summarizer],
        other => anyhow::bail!("unknown agent: {other}"),
    };

    let mut total = RunStats::default();
    for agent in agents {
        let stats = runners.run_pending(agent).await?;
        info!(
            agent = agent.as_str(),
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "agent pass finished"
        );
        total.processed += stats.processed;
        total.succeeded += stats.succeeded;
        total.failed += stats.failed;
        total.dlq_routed += stats.dlq_routed;
        total.deferred += stats.deferred;
    }

    let completed_at = Utc::now();
    let today = completed_at.date_naive();
    let limits = autopiloot_orchestrator::policy_limits(&state.config);

    let mut quota_state = std::collections::BTreeMap::new();
    let youtube_used = state.store.get_quota_usage(today, "youtube").await?;
    if limits.youtube_daily_limit > 0 {
        quota_state.insert(
            "youtube".to_string(),
            youtube_used as f64 / limits.youtube_daily_limit as f64,
        );
    }
    let assemblyai_used = state.store.get_quota_usage(today, "assemblyai").await?;
    if limits.assemblyai_daily_limit > 0 {
        quota_state.insert(
            "assemblyai".to_string(),
            assemblyai_used as f64 / limits.assemblyai_daily_limit as f64,
        );
    }

    let total_cost_usd = state
        .store
        .get_daily_costs(today)
        .await?
        .map(|costs| costs.total_usd)
        .unwrap_or(0.0);

    let summary = RunSummary {
        planned: total.processed,
        succeeded: total.succeeded,
        failed: total.failed,
        dlq_count: total.dlq_routed,
        quota_state,
        total_cost_usd,
    };
    let context = RunContext {
        run_id: format!("daily_{}", today.format("%Y%m%d")),
        run_type: "scheduled_daily".to_string(),
        started_at,
        completed_at: Some(completed_at),
        trigger: "cli".to_string(),
    };
    let alert_level = if total.dlq_routed > 0 || total.failed > total.succeeded {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    };

    let sink = build_sink(&state.config);
    let report = state
        .orchestrator
        .emit_run_events(&summary, &context, None, alert_level, sink.as_ref())
        .await?;

    print_json(&json!({
        "run_id": context.run_id,
        "planned": summary.planned,
        "succeeded": summary.succeeded,
        "failed": summary.failed,
        "dlq_count": summary.dlq_count,
        "deferred": total.deferred,
        "health_score": report.health_score,
        "delivered": report.delivered,
    }))
}

async fn run_report(state_dir: &Path, report: ReportKind) -> anyhow::Result<()> {
    let state = build_state(state_dir).await?;
    match report {
        ReportKind::Daily { date, deliver } => {
            let date = match date {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| anyhow::anyhow!("target_date must be in YYYY-MM-DD format"))?,
                None => (Utc::now() - Duration::days(1)).date_naive(),
            };
            let report = daily_report(&state, date).await?;
            if deliver {
                let sink = build_sink(&state.config);
                let channel = &state.config.notifications.slack.channel;
                if let Err(err) = sink.post(channel, report.slack_blocks.clone()).await {
                    warn!(%err, "daily summary delivery failed");
                }
            }
            print_json(&report)
        }
        ReportKind::Trends {
            hours,
            spike_threshold,
            no_recommendations,
        } => {
            let now = Utc::now();
            let options = TrendOptions {
                window_hours: hours,
                spike_threshold,
                include_recommendations: !no_recommendations,
            };
            let window = Duration::hours(hours.clamp(1, 168) as i64);
            let current = state
                .store
                .query_dlq(&DlqQuery {
                    since: Some(now - window),
                    ..DlqQuery::default()
                })
                .await?;
            let previous = state
                .store
                .query_dlq(&DlqQuery {
                    since: Some(now - window - window),
                    until: Some(now - window),
                    ..DlqQuery::default()
                })
                .await?;
            print_json(&analyze_dlq_trends(&current, &previous, options, now))
        }
        ReportKind::Llm { hours } => {
            let now = Utc::now();
            let since = now - Duration::hours(hours.clamp(1, 720) as i64);
            let entries = state
                .store
                .query_audit(since, now, Some("llm_request"))
                .await?;
            let telemetry_enabled = !env::get_optional_var("LANGFUSE_API_KEY", "").is_empty();
            print_json(&collect_llm_metrics(&entries, telemetry_enabled))
        }
    }
}

async fn daily_report(
    state: &EngineState,
    date: NaiveDate,
) -> anyhow::Result<autopiloot_observability::DailySummaryReport> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date"))?
        .and_utc();
    let end = start + Duration::days(1);

    let limits = autopiloot_orchestrator::policy_limits(&state.config);
    let quota = vec![
        QuotaSnapshot {
            service: "youtube".to_string(),
            used: state.store.get_quota_usage(date, "youtube").await?,
            limit: limits.youtube_daily_limit,
        },
        QuotaSnapshot {
            service: "assemblyai".to_string(),
            used: state.store.get_quota_usage(date, "assemblyai").await?,
            limit: limits.assemblyai_daily_limit,
        },
    ];

    let inputs = DailySummaryInputs {
        date,
        videos_discovered: state.store.videos_created_between(start, end).await?,
        videos_updated: state.store.videos_updated_between(start, end).await?,
        dispatched_jobs: state
            .store
            .query_audit(start, end, Some("job_dispatched"))
            .await?,
        dlq_entries: state
            .store
            .query_dlq(&DlqQuery {
                since: Some(start),
                until: Some(end),
                ..DlqQuery::default()
            })
            .await?,
        costs: state.store.get_daily_costs(date).await?,
        daily_budget_usd: state.config.budgets.transcription_daily_usd,
        quota,
    };

    Ok(build_daily_summary(&inputs))
}

fn parse_job_type(raw: Option<&str>) -> anyhow::Result<Option<JobType>> {
    raw.map(|raw| {
        JobType::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown job type: {raw}"))
    })
    .transpose()
}

fn parse_severity(raw: Option<&str>) -> anyhow::Result<Option<Severity>> {
    raw.map(|raw| {
        Severity::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown severity: {raw}"))
    })
    .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
