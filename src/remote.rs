use anyhow::Result;
use serde_json::Value;

use crate::api::{DownloadRequest, ExportRequest, Operation};
use crate::expression::Expression;

/// The calls the exporter makes against the remote service.
///
/// [`crate::Session`] is the HTTP implementation; tests drive the pipeline
/// through in-memory doubles.
pub trait EarthEngine {
    /// Evaluates `expression` and returns its JSON value.
    fn compute_value(&self, expression: &Expression) -> Result<Value>;

    /// Issues a synchronous GeoTIFF download URL.
    fn download_url(&self, request: &DownloadRequest) -> Result<String>;

    /// Starts a batch export and returns the operation name.
    fn start_export(&self, request: &ExportRequest) -> Result<String>;

    fn operation_status(&self, operation: &str) -> Result<OperationStatus>;

    fn cancel_operation(&self, operation: &str) -> Result<()>;
}

/// Export task state, in the vocabulary of the batch task API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Completed,
    Failed,
    CancelRequested,
    Cancelled,
    Unknown(String),
}

impl TaskState {
    /// Maps operation states (`PENDING`, `SUCCEEDED`, ...) and the legacy
    /// task names (`READY`, `COMPLETED`, ...) onto one enum.
    pub fn from_remote(state: &str) -> Self {
        match state {
            "PENDING" | "READY" | "UNSUBMITTED" => Self::Ready,
            "RUNNING" => Self::Running,
            "SUCCEEDED" | "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLING" | "CANCEL_REQUESTED" => Self::CancelRequested,
            "CANCELLED" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::CancelRequested => "CANCEL_REQUESTED",
            Self::Cancelled => "CANCELLED",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub state: TaskState,
    pub destination_uris: Vec<String>,
    /// Full status payload, kept for diagnostics.
    pub raw: Value,
}

impl OperationStatus {
    pub(crate) fn from_operation(op: Operation, raw: Value) -> Self {
        let (state, destination_uris) = match op.metadata {
            Some(meta) => (meta.state, meta.destination_uris),
            None => (None, Vec::new()),
        };
        let state = match state {
            Some(s) => TaskState::from_remote(&s),
            // Some responses omit metadata once done; fall back to done/error.
            None if op.done && op.error.is_some() => TaskState::Failed,
            None if op.done => TaskState::Completed,
            None => TaskState::Ready,
        };
        Self {
            state,
            destination_uris,
            raw,
        }
    }
}
