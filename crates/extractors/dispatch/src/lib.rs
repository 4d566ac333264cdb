use std::path::Path;

use tracing::debug;
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::ExtractError;
use unfurl_common::model::Extraction;

/// Extract text + metadata from in-memory bytes.
///
/// Routing order: declared/recognized HTML → plain text → unsupported.
/// `declared_mime` (when the container supplied one) wins over the name;
/// the name's extension is the fallback signal. Unsupported content reports
/// the sniffed MIME type so the caller can record what it skipped.
///
/// When `cfg.scrub_html` is off, HTML bytes fall through to the plain-text
/// path: markup is kept verbatim rather than scrubbed.
pub fn extract_bytes(
    bytes: &[u8],
    declared_mime: Option<&str>,
    name: &str,
    cfg: &ConvertConfig,
) -> Result<Extraction, ExtractError> {
    let path = Path::new(name);

    let is_html = declared_mime
        .map(|m| m.to_lowercase().contains("html"))
        .unwrap_or_else(|| unfurl_extract_html::accepts(path));

    if is_html && cfg.scrub_html {
        return unfurl_extract_html::extract_bytes(bytes, cfg);
    }

    let is_text = declared_mime
        .map(|m| m.to_lowercase().starts_with("text/"))
        .unwrap_or(false)
        || unfurl_extract_text::accepts(path)
        || content_is_text(bytes);

    if is_text {
        return unfurl_extract_text::extract_bytes(bytes, cfg);
    }

    let mime = sniff_mime(bytes).unwrap_or("application/octet-stream");
    debug!("no extractor for '{}' ({})", name, mime);
    Err(ExtractError::Unsupported(mime.to_string()))
}

/// Extract text + metadata from a file on disk.
pub fn extract_path(path: &Path, cfg: &ConvertConfig) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    let name = path.to_string_lossy();
    extract_bytes(&bytes, None, &name, cfg)
}

/// Best-effort MIME sniff for binary content.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|t| t.mime_type())
}

fn content_is_text(bytes: &[u8]) -> bool {
    !bytes.is_empty() && content_inspector::inspect(bytes).is_text()
}
