use std::time::Duration;

use anyhow::anyhow;
use reqwest::StatusCode;
use thiserror::Error;

/// Every way a run can fail, one variant per pipeline stage.
///
/// The `Display` text of each variant is what ends up in the `{"error": ...}`
/// payload, so it stays on a single line where the remote message allows it.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Credentials, configuration or project could not be set up.
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// The snippet could not be parsed or its bindings do not resolve.
    #[error("error executing snippet: {0}")]
    Execution(String),
    /// The snippet parsed but bound neither `result` nor `image`.
    #[error("snippet did not define `result` or `image`")]
    MissingResult,
    #[error("computing image bounds failed: {0}")]
    Geometry(String),
    /// Synchronous download failed for a reason other than the size limit.
    #[error("download URL request failed: {0}")]
    Download(String),
    #[error("batch export submission failed: {0}")]
    ExportSubmission(String),
    /// Terminal non-completed state; carries the raw operation JSON.
    #[error("batch export failed: {0}")]
    ExportFailed(String),
    #[error("no URIs returned by batch export")]
    NoOutput,
    #[error("export status query failed: {0}")]
    Status(String),
    #[error("timed out after {}s waiting for export {operation}", .elapsed.as_secs())]
    Timeout {
        operation: String,
        elapsed: Duration,
    },
    #[error("export {0} was cancelled locally")]
    Cancelled(String),
}

/// Renders an `anyhow` chain on one line (`outer: inner: root`).
pub(crate) fn flatten(err: &anyhow::Error) -> String {
    format!("{err:#}").replace('\n', " ")
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct GoogleErrorResponse {
    pub(crate) error: GoogleErrorBody,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct GoogleErrorBody {
    #[serde(default)]
    pub(crate) code: Option<u16>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

pub(crate) fn format_api_error(
    status: StatusCode,
    url: &str,
    e: &GoogleErrorResponse,
) -> anyhow::Error {
    let message = e.error.message.as_deref().unwrap_or("");
    let kind = e.error.status.as_deref().unwrap_or("");
    let code = e.error.code.unwrap_or(status.as_u16());

    // Unregistered projects are the most common first-run failure.
    let looks_unregistered = status == StatusCode::FORBIDDEN
        && (message.to_lowercase().contains("not registered")
            || message.to_lowercase().contains("earth engine api has not been used"));
    if looks_unregistered {
        return anyhow!(
            "Earth Engine returned 403: the project is not registered or the API is disabled (enable it at https://console.cloud.google.com/apis/library/earthengine.googleapis.com). Server message: {}",
            message
        );
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!(
            "Earth Engine authentication/authorization failed (HTTP {}, {}). Check that the access token is valid and not expired, or re-run `earthengine authenticate` to refresh the cached credentials. Server message: {} (request: {})",
            code,
            if kind.is_empty() { "no status" } else { kind },
            message,
            url
        );
    }

    if status == StatusCode::NOT_FOUND {
        return anyhow!(
            "Earth Engine endpoint not found (HTTP 404); check the project id and the API base URL (default https://earthengine.googleapis.com). Server message: {} (request: {})",
            message,
            url
        );
    }

    anyhow!(
        "API request failed: HTTP {} for url ({}): {}",
        code,
        url,
        message
    )
}
