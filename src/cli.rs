//! Command-line interface definitions for the `gee-export` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use gee_export::logging::LogFormat;
use gee_export::{BandType, ExportOptions, PollConfig, Settings};

/// Export an Earth Engine image and print `{"download_url": ...}` or
/// `{"error": ...}` as a single JSON line.
#[derive(Debug, Parser)]
#[command(name = "gee-export", version, about)]
pub struct Cli {
    /// Snippet JSON binding `result` or `image`; `-` reads standard input.
    #[arg(value_name = "SNIPPET", conflicts_with = "snippet_file")]
    pub snippet: Option<String>,

    /// Read the snippet from a file.
    #[arg(long, value_name = "PATH")]
    pub snippet_file: Option<PathBuf>,

    /// Template whose `{GENERATED_CODE}` placeholder receives the snippet.
    #[arg(long, value_name = "PATH")]
    pub template: Option<PathBuf>,

    /// Cloud project id [env: GEE_PROJECT_ID]
    #[arg(long)]
    pub project: Option<String>,

    /// Bucket batch exports write to [env: GCS_BUCKET_NAME]
    #[arg(long)]
    pub bucket: Option<String>,

    /// Earth Engine API base URL [env: GEE_API_URL]
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// OAuth access token [env: GEE_ACCESS_TOKEN]
    #[arg(long, value_name = "TOKEN")]
    pub access_token: Option<String>,

    /// Cached credentials file [env: GEE_CREDENTIALS]
    #[arg(long, value_name = "PATH")]
    pub credentials: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Output resolution in CRS units.
    #[arg(long, default_value_t = 10.0)]
    pub scale: f64,

    #[arg(long, default_value = "EPSG:4326")]
    pub crs: String,

    /// Numeric type every band is cast to.
    #[arg(long, value_enum, default_value_t = BandType::Float)]
    pub band_type: BandType,

    #[arg(long, default_value_t = 10_000_000_000_000)]
    pub max_pixels: u64,

    /// Batch export task description.
    #[arg(long, default_value = "gee_export")]
    pub description: String,

    /// First wait between export status checks.
    #[arg(
        long,
        value_name = "MS",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    /// Longest wait between export status checks.
    #[arg(
        long,
        value_name = "MS",
        default_value_t = 60_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_max_interval_ms: u64,

    /// Give up waiting after this many seconds; 0 waits forever.
    #[arg(long, value_name = "SECS", default_value_t = 6 * 60 * 60)]
    pub poll_timeout_secs: u64,

    /// Cancel the remote export when the wait times out.
    #[arg(long)]
    pub cancel_on_timeout: bool,

    /// Hide the progress spinner.
    #[arg(long)]
    pub no_progress: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            project: self.project.clone(),
            bucket: self.bucket.clone(),
            api_url: self.api_url.clone(),
            access_token: self.access_token.clone(),
            credentials: self.credentials.clone(),
            verify: self.insecure.then_some(false),
        }
    }

    pub fn export_options(&self, bucket: &str) -> ExportOptions {
        let interval = Duration::from_millis(self.poll_interval_ms);
        ExportOptions {
            scale: self.scale,
            crs: self.crs.clone(),
            band_type: self.band_type,
            max_pixels: self.max_pixels,
            description: self.description.clone(),
            poll: PollConfig {
                interval,
                max_interval: Duration::from_millis(self.poll_max_interval_ms).max(interval),
                timeout: (self.poll_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.poll_timeout_secs)),
            },
            cancel_on_timeout: self.cancel_on_timeout,
            progress: !self.no_progress,
            ..ExportOptions::new(bucket)
        }
    }
}
