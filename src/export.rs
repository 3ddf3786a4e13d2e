//! The export pipeline: cast, bounds, synchronous download, batch fallback.

use tracing::{debug, info, warn};

use crate::api::{DownloadRequest, ExportRequest};
use crate::error::{ExportError, flatten};
use crate::expression::{BandType, Image, Region};
use crate::poll::{CancelToken, PollConfig, wait_for_export};
use crate::remote::EarthEngine;
use crate::snippet::Snippet;
use crate::util::{is_size_limit, unique_prefix};

/// How an image is exported. Defaults mirror the command-line defaults.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Cloud Storage bucket for batch exports.
    pub bucket: String,
    /// Output resolution, in CRS units.
    pub scale: f64,
    pub crs: String,
    pub band_type: BandType,
    /// Pixel ceiling passed to batch exports.
    pub max_pixels: u64,
    pub description: String,
    pub poll: PollConfig,
    /// Ask the service to cancel the export when the wait times out.
    pub cancel_on_timeout: bool,
    pub progress: bool,
}

impl ExportOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            scale: 10.0,
            crs: "EPSG:4326".to_string(),
            band_type: BandType::Float,
            max_pixels: 10_000_000_000_000,
            description: "gee_export".to_string(),
            poll: PollConfig::default(),
            cancel_on_timeout: false,
            progress: true,
        }
    }
}

/// Evaluates `snippet` and exports the image it binds.
///
/// Nothing is sent to the service when the snippet does not resolve.
pub fn export_snippet<E: EarthEngine + ?Sized>(
    remote: &E,
    snippet: Snippet,
    options: &ExportOptions,
    cancel: &CancelToken,
) -> Result<String, ExportError> {
    let image = snippet.evaluate()?;
    export_image(remote, image, options, cancel)
}

/// Returns a download URL for `image`.
///
/// Tries a synchronous GeoTIFF download first. Only the service's size-limit
/// error switches to a batch export, which is submitted once and then polled.
pub fn export_image<E: EarthEngine + ?Sized>(
    remote: &E,
    image: Image,
    options: &ExportOptions,
    cancel: &CancelToken,
) -> Result<String, ExportError> {
    let image = image.cast(options.band_type);
    let region = compute_region(remote, &image)?;
    debug!(region = %region.coordinates(), "image bounds computed");
    let image = image.prepare(&options.crs, options.scale, &region);

    match remote.download_url(&DownloadRequest::geotiff(image.expression().clone())) {
        Ok(url) => {
            info!("synchronous download URL issued");
            return Ok(url);
        }
        Err(e) => {
            let message = flatten(&e);
            if !is_size_limit(&message) {
                return Err(ExportError::Download(message));
            }
            warn!(error = %message, "image too large for direct download, starting batch export");
        }
    }

    let prefix = unique_prefix();
    let request = ExportRequest::geotiff_to_bucket(
        image.expression().clone(),
        &options.description,
        &options.bucket,
        &prefix,
        options.max_pixels,
    );
    let operation = remote
        .start_export(&request)
        .map_err(|e| ExportError::ExportSubmission(flatten(&e)))?;

    let result = wait_for_export(remote, &operation, &options.poll, cancel, options.progress);
    if options.cancel_on_timeout && matches!(result, Err(ExportError::Timeout { .. })) {
        match remote.cancel_operation(&operation) {
            Ok(()) => info!(%operation, "cancel requested for timed-out export"),
            Err(e) => warn!(%operation, error = %flatten(&e), "failed to cancel timed-out export"),
        }
    }
    result
}

fn compute_region<E: EarthEngine + ?Sized>(
    remote: &E,
    image: &Image,
) -> Result<Region, ExportError> {
    let geometry = remote
        .compute_value(&image.bounds())
        .map_err(|e| ExportError::Geometry(flatten(&e)))?;
    Region::from_geojson(&geometry).ok_or_else(|| {
        ExportError::Geometry(format!("bounds result has no coordinates: {}", geometry))
    })
}
