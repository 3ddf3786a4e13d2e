use serde::Serialize;
use serde_json::Value;

use crate::expression::Expression;

const GEO_TIFF: &str = "GEO_TIFF";

/// Body of `projects.thumbnails.create`, used for GeoTIFF download ids.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub expression: Expression,
    pub file_format: String,
}

impl DownloadRequest {
    pub fn geotiff(expression: Expression) -> Self {
        Self {
            expression,
            file_format: GEO_TIFF.to_string(),
        }
    }
}

/// Body of `projects.image.export` targeting Cloud Storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub expression: Expression,
    pub description: String,
    pub file_export_options: FileExportOptions,
    /// Serialized as a string, the REST API's int64 encoding.
    #[serde(serialize_with = "as_string")]
    pub max_pixels: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExportOptions {
    pub file_format: String,
    pub cloud_storage_destination: CloudStorageDestination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudStorageDestination {
    pub bucket: String,
    pub filename_prefix: String,
}

impl ExportRequest {
    pub fn geotiff_to_bucket(
        expression: Expression,
        description: &str,
        bucket: &str,
        prefix: &str,
        max_pixels: u64,
    ) -> Self {
        Self {
            expression,
            description: description.to_string(),
            file_export_options: FileExportOptions {
                file_format: GEO_TIFF.to_string(),
                cloud_storage_destination: CloudStorageDestination {
                    bucket: bucket.to_string(),
                    filename_prefix: prefix.to_string(),
                },
            },
            max_pixels,
        }
    }
}

fn as_string<S: serde::Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ThumbnailId {
    pub(crate) name: String,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ComputeValueResponse {
    #[serde(default)]
    pub(crate) result: Value,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct Operation {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) metadata: Option<OperationMetadata>,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationMetadata {
    #[serde(default)]
    pub(crate) state: Option<String>,
    #[serde(default)]
    pub(crate) destination_uris: Vec<String>,
}
