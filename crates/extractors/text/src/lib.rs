use std::path::Path;

use content_inspector::{inspect, ContentType};
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::ExtractError;
use unfurl_common::model::Extraction;
use unfurl_common::textutil::reduce_line_breaks;

/// Check if a file path is likely a text file based on extension.
pub fn accepts(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if is_text_ext(ext) {
            return true;
        }
    }
    // Fallback: sniff first 8 KB
    if let Ok(bytes) = read_head(path, 8192) {
        return inspect(&bytes).is_text();
    }
    false
}

pub fn is_text_ext(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "txt" | "text" | "log" | "md" | "markdown" | "rst" | "csv" | "tsv"
        | "json" | "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf"
        | "xml" | "sql" | "diff" | "patch"
    )
}

/// Extract plain text from a file.
pub fn extract(path: &Path, cfg: &ConvertConfig) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes, cfg)
}

/// Extract plain text from in-memory bytes: sniff the encoding, decode to
/// UTF-8, collapse repeated blank lines. Binary content is rejected as
/// unsupported; content over the size cap is the distinct truncated failure.
pub fn extract_bytes(bytes: &[u8], cfg: &ConvertConfig) -> Result<Extraction, ExtractError> {
    if bytes.len() > cfg.max_text_bytes {
        return Err(ExtractError::Truncated {
            limit: cfg.max_text_bytes,
        });
    }

    let kind = inspect(bytes);
    let (text, encoding) = match kind {
        ContentType::BINARY => {
            return Err(ExtractError::Unsupported("application/octet-stream".into()))
        }
        ContentType::UTF_16LE => (decode_utf16(bytes, u16::from_le_bytes), "utf-16le"),
        ContentType::UTF_16BE => (decode_utf16(bytes, u16::from_be_bytes), "utf-16be"),
        // UTF_8, UTF_8_BOM, and the latin-ish rest: lossy UTF-8 is the
        // canonical decode.
        _ => {
            let stripped = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
            (String::from_utf8_lossy(stripped).into_owned(), "utf-8")
        }
    };

    Ok(Extraction {
        text: reduce_line_breaks(text.trim_end()),
        encoding: Some(encoding.to_string()),
        properties: Default::default(),
    })
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| from_bytes([c[0], c[1]]))
        .collect();
    // Skip the BOM if present; from_utf16_lossy handles unpaired surrogates.
    let units = match units.first() {
        Some(&0xfeff) => &units[1..],
        _ => &units[..],
    };
    String::from_utf16_lossy(units)
}

fn read_head(path: &Path, n: usize) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut f = std::fs::File::open(path)?;
    let mut buf = vec![0u8; n];
    let read = f.read(&mut buf)?;
    buf.truncate(read);
    Ok(buf)
}
