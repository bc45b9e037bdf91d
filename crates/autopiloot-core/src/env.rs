// Credential resolution
// Secrets arrive exclusively through environment variables; file-backed
// credentials are validated for existence before any client is built.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable {name} is not set{}", describe(.description))]
    Missing { name: String, description: String },

    #[error("file specified in {name} does not exist: {path}")]
    FileNotFound { name: String, path: PathBuf },

    #[error("environment validation failed:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

fn describe(description: &str) -> String {
    if description.is_empty() {
        String::new()
    } else {
        format!(" ({description})")
    }
}

/// Required variable; unset or blank is an error.
pub fn get_required_var(name: &str, description: &str) -> Result<String, EnvError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(EnvError::Missing {
            name: name.to_string(),
            description: description.to_string(),
        }),
    }
}

/// Alias kept for callers written against the older name; identical
/// contract to [`get_required_var`].
pub fn get_required_env_var(name: &str, description: &str) -> Result<String, EnvError> {
    get_required_var(name, description)
}

pub fn get_optional_var(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Required variable that must point at an existing file.
pub fn validate_file_path(name: &str, description: &str) -> Result<PathBuf, EnvError> {
    let raw = get_required_var(name, description)?;
    let path = PathBuf::from(&raw);
    if path.exists() {
        Ok(path)
    } else {
        Err(EnvError::FileNotFound {
            name: name.to_string(),
            path,
        })
    }
}

/// Service-account path: `GOOGLE_SERVICE_ACCOUNT_PATH` preferred,
/// `GOOGLE_APPLICATION_CREDENTIALS` accepted.
pub fn service_credentials_path() -> Result<PathBuf, EnvError> {
    for name in ["GOOGLE_SERVICE_ACCOUNT_PATH", "GOOGLE_APPLICATION_CREDENTIALS"] {
        if let Ok(raw) = std::env::var(name) {
            let path = Path::new(raw.trim());
            if !raw.trim().is_empty() && path.exists() {
                return Ok(path.to_path_buf());
            }
        }
    }
    Err(EnvError::Invalid(vec![
        "no valid Google Cloud credentials found; set either:".to_string(),
        "  - GOOGLE_SERVICE_ACCOUNT_PATH=/path/to/service-account.json".to_string(),
        "  - GOOGLE_APPLICATION_CREDENTIALS=/path/to/service-account.json".to_string(),
    ]))
}

/// Validate the full set of required variables, collecting every problem
/// into one actionable error instead of failing on the first.
pub fn validate_required_environment() -> Result<Vec<(String, String)>, EnvError> {
    let mut resolved = Vec::new();
    let mut problems = Vec::new();

    for (name, description) in [
        ("OPENAI_API_KEY", "OpenAI API key for summary generation"),
        ("YOUTUBE_API_KEY", "YouTube Data API key for video discovery"),
        ("GCP_PROJECT_ID", "Google Cloud project id for the state store"),
    ] {
        match get_required_var(name, description) {
            Ok(value) => resolved.push((name.to_string(), value)),
            Err(err) => problems.push(format!("  - {err}")),
        }
    }

    match service_credentials_path() {
        Ok(path) => resolved.push((
            "GOOGLE_SERVICE_ACCOUNT_PATH".to_string(),
            path.display().to_string(),
        )),
        Err(err) => problems.push(format!("  - {err}")),
    }

    if problems.is_empty() {
        Ok(resolved)
    } else {
        Err(EnvError::Invalid(problems))
    }
}

/// Optional integrations; absent keys disable the feature rather than fail.
pub fn optional_integrations() -> Vec<(&'static str, bool)> {
    ["ASSEMBLYAI_API_KEY", "SLACK_BOT_TOKEN", "ZEP_API_KEY"]
        .into_iter()
        .map(|name| {
            let configured = std::env::var(name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            (name, configured)
        })
        .collect()
}
