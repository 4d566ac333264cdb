//! Typed failure kinds for extraction and conversion.

use thiserror::Error;

/// Failures from the text-extraction adapter. "Unsupported" and "Truncated"
/// are deliberately distinct kinds: a caller that skips unparseable content
/// may still want to surface documents cut off by the size cap.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported media type: {0}")]
    Unsupported(String),

    #[error("extracted text exceeds cap of {limit} bytes")]
    Truncated { limit: usize },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whole-document conversion failures. Part-level trouble inside a container
/// never surfaces here — it is logged and the part skipped.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported archive type: {0}")]
    UnsupportedArchive(String),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    #[error("malformed container: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
