use std::io::Write;
use std::process::ExitCode;

use serde::Serialize;

use crate::error::ExportError;

/// The single JSON line a run prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Success { download_url: String },
    Failure { error: String },
}

impl Report {
    pub fn success(download_url: impl Into<String>) -> Self {
        Self::Success {
            download_url: download_url.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// `0` on success, `1` otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    /// Writes the payload followed by a newline and flushes.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        serde_json::to_writer(&mut *out, self)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

impl From<Result<String, ExportError>> for Report {
    fn from(result: Result<String, ExportError>) -> Self {
        match result {
            Ok(url) => Self::success(url),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
