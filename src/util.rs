use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Substring the remote service puts in its "payload too large" error.
pub(crate) const SIZE_LIMIT_MARKER: &str = "Total request size";

const GCS_SCHEME: &str = "gs://";
const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com/";

/// Smallest wait `backoff` hands out, so a zero start still grows.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let max = max.max(MIN_BACKOFF);
    let next = current.mul_f64(1.5).max(MIN_BACKOFF);
    if next > max { max } else { next }
}

pub(crate) fn is_size_limit(message: &str) -> bool {
    message.contains(SIZE_LIMIT_MARKER)
}

/// Rewrites a `gs://bucket/object` URI to its public HTTPS form.
///
/// URIs with another scheme are returned unchanged.
pub fn public_url(uri: &str) -> String {
    match uri.strip_prefix(GCS_SCHEME) {
        Some(rest) => format!("{}{}", GCS_PUBLIC_BASE, rest),
        None => uri.to_string(),
    }
}

/// `export_<unix seconds>_<8 hex chars>`, unique across runs.
pub(crate) fn unique_prefix() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let uid = uuid::Uuid::new_v4().simple().to_string();
    format!("export_{}_{}", timestamp, &uid[..8])
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn append_query(url: &str, params: &[(&str, &str)]) -> String {
    let mut out = url.to_string();
    let sep = if url.contains('?') { '&' } else { '?' };
    out.push(sep);
    let mut first = true;
    for (k, v) in params {
        if !first {
            out.push('&');
        }
        first = false;
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}
