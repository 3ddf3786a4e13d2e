use std::path::PathBuf;

use crate::credentials::AuthSource;
use crate::error::ExportError;

pub const PROJECT_ENV: &str = "GEE_PROJECT_ID";
pub const BUCKET_ENV: &str = "GCS_BUCKET_NAME";
pub const API_URL_ENV: &str = "GEE_API_URL";
pub const ACCESS_TOKEN_ENV: &str = "GEE_ACCESS_TOKEN";
pub const CREDENTIALS_ENV: &str = "GEE_CREDENTIALS";

pub const DEFAULT_API_URL: &str = "https://earthengine.googleapis.com";

/// Explicit overrides; anything left `None` falls back to the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub project: Option<String>,
    pub bucket: Option<String>,
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    pub credentials: Option<PathBuf>,
    pub verify: Option<bool>,
}

/// Validated connection configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Base API URL, typically `https://earthengine.googleapis.com`.
    pub api_url: String,
    /// Cloud project the session is bound to.
    pub project: String,
    /// Cloud Storage bucket batch exports write to.
    pub bucket: String,
    pub auth: AuthSource,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

/// Builds the configuration from (in order of precedence):
/// - explicit `settings`
/// - environment variables (`GEE_PROJECT_ID`, `GCS_BUCKET_NAME`, ...)
/// - the cached credentials file in the user's home directory
pub fn load_config(settings: Settings) -> Result<ExportConfig, ExportError> {
    resolve(
        settings,
        |name| std::env::var(name).ok(),
        &credential_candidates(),
    )
}

fn resolve(
    settings: Settings,
    env: impl Fn(&str) -> Option<String>,
    candidates: &[PathBuf],
) -> Result<ExportConfig, ExportError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let project = non_empty(settings.project.or_else(|| env(PROJECT_ENV)))
        .ok_or_else(|| ExportError::Initialization(format!("{} not set", PROJECT_ENV)))?;
    let project = validate_project(project.trim())?;

    let bucket = non_empty(settings.bucket.or_else(|| env(BUCKET_ENV)))
        .ok_or_else(|| ExportError::Initialization(format!("{} not set", BUCKET_ENV)))?;
    let bucket = normalize_bucket(&bucket)?;

    let api_url = non_empty(settings.api_url.or_else(|| env(API_URL_ENV)))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    let auth = match non_empty(settings.access_token.or_else(|| env(ACCESS_TOKEN_ENV))) {
        Some(token) => AuthSource::AccessToken(token),
        None => AuthSource::CredentialsFile(credentials_path(
            settings
                .credentials
                .or_else(|| env(CREDENTIALS_ENV).map(PathBuf::from)),
            candidates,
        )?),
    };

    Ok(ExportConfig {
        api_url,
        project,
        bucket,
        auth,
        verify: settings.verify.unwrap_or(true),
    })
}

fn credentials_path(
    explicit: Option<PathBuf>,
    candidates: &[PathBuf],
) -> Result<PathBuf, ExportError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ExportError::Initialization(format!(
                "credentials file {} not found",
                path.display()
            )));
        }
        return Ok(path);
    }

    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .ok_or_else(|| {
            ExportError::Initialization(format!(
                "no credentials found (set {} or run `earthengine authenticate`; looked in: {})",
                ACCESS_TOKEN_ENV,
                if candidates.is_empty() {
                    "(no home directory)".to_string()
                } else {
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            ))
        })
}

fn validate_project(project: &str) -> Result<String, ExportError> {
    let ok = project
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':' | '_'));
    if !ok {
        return Err(ExportError::Initialization(format!(
            "invalid project id `{}`",
            project
        )));
    }
    Ok(project.to_string())
}

/// Accepts `name`, `gs://name` or `gs://name/`.
fn normalize_bucket(bucket: &str) -> Result<String, ExportError> {
    let name = bucket.trim();
    let name = name.strip_prefix("gs://").unwrap_or(name).trim_end_matches('/');
    if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
        return Err(ExportError::Initialization(format!(
            "invalid bucket name `{}`",
            bucket
        )));
    }
    Ok(name.to_string())
}

fn credential_candidates() -> Vec<PathBuf> {
    // Same location the Earth Engine command-line tool writes to.
    match dirs::home_dir() {
        Some(home) => vec![home.join(".config").join("earthengine").join("credentials")],
        None => Vec::new(),
    }
}
