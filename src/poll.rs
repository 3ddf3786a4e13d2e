//! Waiting on a submitted batch export.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::error::{ExportError, flatten};
use crate::remote::{EarthEngine, OperationStatus, TaskState};
use crate::util::{backoff, public_url};

const CANCEL_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// First sleep between status checks.
    pub interval: Duration,
    /// Upper bound the sleep grows to.
    pub max_interval: Duration,
    /// Overall wait budget; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            timeout: Some(Duration::from_secs(6 * 60 * 60)),
        }
    }
}

/// Shared flag that stops a wait between status checks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polls `operation` until it leaves `READY`/`RUNNING` and returns the public
/// URL of its first output file.
pub fn wait_for_export<E: EarthEngine + ?Sized>(
    remote: &E,
    operation: &str,
    config: &PollConfig,
    cancel: &CancelToken,
    progress: bool,
) -> Result<String, ExportError> {
    let started = Instant::now();
    let mut sleep = config.interval;
    let mut last_state: Option<TaskState> = None;
    let spinner = progress.then(|| new_spinner(operation));

    let result = loop {
        if cancel.is_cancelled() {
            break Err(ExportError::Cancelled(operation.to_string()));
        }

        let status = match remote.operation_status(operation) {
            Ok(status) => status,
            Err(e) => break Err(ExportError::Status(flatten(&e))),
        };

        if last_state.as_ref() != Some(&status.state) {
            info!(operation, state = status.state.as_str(), "export state changed");
            if let Some(pb) = &spinner {
                pb.set_message(format!("export {}", status.state.as_str()));
            }
            last_state = Some(status.state.clone());
        }

        if !status.state.is_active() {
            break resolve(status);
        }

        let elapsed = started.elapsed();
        let wait = match config.timeout {
            Some(limit) if elapsed >= limit => {
                break Err(ExportError::Timeout {
                    operation: operation.to_string(),
                    elapsed,
                });
            }
            Some(limit) => sleep.min(limit - elapsed),
            None => sleep,
        };
        debug!(operation, wait_ms = wait.as_millis() as u64, "export still active");
        if !pause(wait, cancel) {
            break Err(ExportError::Cancelled(operation.to_string()));
        }
        sleep = backoff(sleep, config.max_interval);
    };

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    result
}

fn resolve(status: OperationStatus) -> Result<String, ExportError> {
    match status.state {
        TaskState::Completed => {
            let uri = status
                .destination_uris
                .first()
                .ok_or(ExportError::NoOutput)?;
            Ok(public_url(uri))
        }
        _ => Err(ExportError::ExportFailed(status.raw.to_string())),
    }
}

/// Sleeps for `duration`; returns `false` as soon as `cancel` fires.
fn pause(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(CANCEL_SLICE));
    }
}

fn new_spinner(operation: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("waiting for {}", operation));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
