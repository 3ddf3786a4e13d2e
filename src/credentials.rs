use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client as HttpClient;
use tracing::debug;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);
/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where the bearer token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    /// A ready-made OAuth access token, used as is.
    AccessToken(String),
    /// Cached refresh-token credentials, as written by `earthengine authenticate`.
    CredentialsFile(PathBuf),
}

#[derive(Debug, serde::Deserialize)]
struct CachedCredentials {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct Credentials {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Static(String),
    Refreshing {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
        current: Mutex<(String, Instant)>,
    },
}

impl Credentials {
    /// Resolves `source` into a usable token; cached credentials are
    /// exchanged right away so bad files fail here.
    pub(crate) fn acquire(source: &AuthSource, http: &HttpClient) -> Result<Self> {
        match source {
            AuthSource::AccessToken(token) => {
                let token = token.trim();
                if token.is_empty() {
                    bail!("access token is empty");
                }
                Ok(Self {
                    kind: Kind::Static(token.to_string()),
                })
            }
            AuthSource::CredentialsFile(path) => {
                let cached = read_cached(path).with_context(|| {
                    format!("failed to read credentials file {}", path.display())
                })?;
                let client_id = cached.client_id.ok_or_else(|| {
                    anyhow!(
                        "credentials file {} has no client_id; pass an access token instead",
                        path.display()
                    )
                })?;
                let client_secret = cached.client_secret.ok_or_else(|| {
                    anyhow!(
                        "credentials file {} has no client_secret; pass an access token instead",
                        path.display()
                    )
                })?;
                let token_uri = cached
                    .token_uri
                    .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

                let current = exchange(
                    http,
                    &token_uri,
                    &client_id,
                    &client_secret,
                    &cached.refresh_token,
                )?;
                Ok(Self {
                    kind: Kind::Refreshing {
                        client_id,
                        client_secret,
                        refresh_token: cached.refresh_token,
                        token_uri,
                        current: Mutex::new(current),
                    },
                })
            }
        }
    }

    /// Current bearer token, refreshed when close to expiry.
    pub(crate) fn bearer(&self, http: &HttpClient) -> Result<String> {
        match &self.kind {
            Kind::Static(token) => Ok(token.clone()),
            Kind::Refreshing {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
                current,
            } => {
                let mut current = current
                    .lock()
                    .map_err(|_| anyhow!("credential cache lock poisoned"))?;
                if Instant::now() + REFRESH_MARGIN >= current.1 {
                    debug!("access token near expiry, refreshing");
                    *current = exchange(http, token_uri, client_id, client_secret, refresh_token)?;
                }
                Ok(current.0.clone())
            }
        }
    }
}

fn read_cached(path: &Path) -> Result<CachedCredentials> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).context("credentials file is not valid JSON")
}

fn exchange(
    http: &HttpClient,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<(String, Instant)> {
    let resp = http
        .post(token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ])
        .send()
        .with_context(|| format!("token request to {} failed", token_uri))?;

    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    if !status.is_success() {
        bail!(
            "token refresh failed: HTTP {} from {}: {}",
            status,
            token_uri,
            text.trim()
        );
    }

    let token: TokenResponse =
        serde_json::from_str(&text).context("failed to parse token response")?;
    let lifetime = token
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LIFETIME);
    Ok((token.access_token, Instant::now() + lifetime))
}
