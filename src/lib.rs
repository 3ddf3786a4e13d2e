//! Turn an Earth Engine image into a GeoTIFF download URL.
//!
//! The flow mirrors what you would do by hand in the Earth Engine client:
//! evaluate an image expression, ask for a direct download URL, and when the
//! service answers that the request is too large, run a batch export to Cloud
//! Storage, wait for it and hand back the public URL of the written file.
//!
//! ## Quick start
//! - Set `GEE_PROJECT_ID` and `GCS_BUCKET_NAME`.
//! - Authenticate with `GEE_ACCESS_TOKEN`, or let the crate use the cached
//!   credentials written by `earthengine authenticate`.
//! - Pass a snippet (see [`Snippet`]) to [`export_snippet`].
//!
//! ```no_run
//! use gee_export::{
//!     CancelToken, ExportOptions, Session, Settings, Snippet, export_snippet, load_config,
//! };
//!
//! fn main() -> Result<(), gee_export::ExportError> {
//!     let config = load_config(Settings::default())?;
//!     let session = Session::connect(&config)?;
//!     let snippet = Snippet::parse(r#"{
//!         "image": { "functionInvocationValue": {
//!             "functionName": "Image.load",
//!             "arguments": { "id": { "constantValue": "USGS/SRTMGL1_003" } } } }
//!     }"#)?;
//!     let options = ExportOptions::new(&config.bucket);
//!     let url = export_snippet(&session, snippet, &options, &CancelToken::new())?;
//!     println!("{url}");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod api;
mod config;
mod credentials;
mod error;
mod export;
mod expression;
pub mod logging;
mod poll;
mod remote;
mod report;
mod session;
mod snippet;
mod util;

pub use api::{CloudStorageDestination, DownloadRequest, ExportRequest, FileExportOptions};
pub use config::{
    ACCESS_TOKEN_ENV, API_URL_ENV, BUCKET_ENV, CREDENTIALS_ENV, DEFAULT_API_URL, ExportConfig,
    PROJECT_ENV, Settings, load_config,
};
pub use credentials::AuthSource;
pub use error::ExportError;
pub use export::{ExportOptions, export_image, export_snippet};
pub use expression::{
    ArrayValue, BandType, DictionaryValue, Expression, FunctionDefinition, FunctionInvocation,
    Image, Region, ValueNode,
};
pub use poll::{CancelToken, PollConfig, wait_for_export};
pub use remote::{EarthEngine, OperationStatus, TaskState};
pub use report::Report;
pub use session::Session;
pub use snippet::{RESULT_NAMES, Snippet, TEMPLATE_PLACEHOLDER};
pub use util::public_url;
