use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::api::{ComputeValueResponse, DownloadRequest, ExportRequest, Operation, ThumbnailId};
use crate::config::ExportConfig;
use crate::credentials::Credentials;
use crate::error::{ExportError, GoogleErrorResponse, flatten, format_api_error};
use crate::expression::Expression;
use crate::remote::{EarthEngine, OperationStatus};
use crate::util::{append_query, urljoin};

const API_VERSION: &str = "v1";

/// Authenticated handle to the Earth Engine REST API, bound to one project.
#[derive(Debug)]
pub struct Session {
    api_url: String,
    project: String,
    credentials: Credentials,
    http: HttpClient,
}

impl Session {
    /// Acquires credentials and checks that the project is reachable.
    ///
    /// Every failure is an [`ExportError::Initialization`]; nothing is retried.
    pub fn connect(config: &ExportConfig) -> Result<Self, ExportError> {
        Self::open(config).map_err(|e| ExportError::Initialization(flatten(&e)))
    }

    fn open(config: &ExportConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gee-export/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("gee-export")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(60));

        if !config.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;
        let credentials = Credentials::acquire(&config.auth, &http)?;

        let session = Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            credentials,
            http,
        };

        let _: Value = session
            .api_json("GET", &session.project_url("config"), &Value::Null)
            .with_context(|| format!("project {} is not usable", session.project))?;
        info!(project = %session.project, "Earth Engine session opened");
        Ok(session)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn versioned(&self, path: &str) -> String {
        urljoin(&format!("{}/{}", self.api_url, API_VERSION), path)
    }

    fn project_url(&self, suffix: &str) -> String {
        self.versioned(&format!("projects/{}/{}", self.project, suffix))
    }

    fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.credentials.bearer(&self.http)?;
        Ok(req.bearer_auth(token))
    }

    fn api_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        method: &str,
        url: &str,
        request: &TReq,
    ) -> Result<TResp> {
        let req = match method {
            "GET" => self.http.get(url),
            _ => self.http.post(url),
        };
        let req = self.authorize(req)?;
        let req = if method == "GET" { req } else { req.json(request) };
        debug!(method, url, "API request");

        let resp = req
            .send()
            .with_context(|| format!("could not connect to {}", url))?;

        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            if let Ok(err_json) = serde_json::from_str::<GoogleErrorResponse>(&text) {
                return Err(format_api_error(status, url, &err_json));
            }

            bail!(
                "API request failed: HTTP {} for url ({}): {}",
                status,
                url,
                text.trim()
            );
        }

        serde_json::from_str::<TResp>(&text)
            .with_context(|| format!("failed to parse API JSON (url={}, status={})", url, status))
    }
}

impl EarthEngine for Session {
    fn compute_value(&self, expression: &Expression) -> Result<Value> {
        let url = self.project_url("value:compute");
        let resp: ComputeValueResponse =
            self.api_json("POST", &url, &json!({ "expression": expression }))?;
        Ok(resp.result)
    }

    fn download_url(&self, request: &DownloadRequest) -> Result<String> {
        let url = append_query(&self.project_url("thumbnails"), &[("fields", "name")]);
        let id: ThumbnailId = self.api_json("POST", &url, request)?;
        Ok(format!("{}:getPixels", self.versioned(&id.name)))
    }

    fn start_export(&self, request: &ExportRequest) -> Result<String> {
        let url = self.project_url("image:export");
        let op: Operation = self.api_json("POST", &url, request)?;
        let prefix = &request.file_export_options.cloud_storage_destination.filename_prefix;
        info!(operation = %op.name, %prefix, "batch export submitted");
        Ok(op.name)
    }

    fn operation_status(&self, operation: &str) -> Result<OperationStatus> {
        let raw: Value = self.api_json("GET", &self.versioned(operation), &Value::Null)?;
        let op: Operation = serde_json::from_value(raw.clone())
            .with_context(|| format!("unexpected operation payload for {}", operation))?;
        Ok(OperationStatus::from_operation(op, raw))
    }

    fn cancel_operation(&self, operation: &str) -> Result<()> {
        let url = format!("{}:cancel", self.versioned(operation));
        let _: Value = self.api_json("POST", &url, &json!({}))?;
        Ok(())
    }
}
