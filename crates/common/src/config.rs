use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Conversion settings, threaded explicitly into every decomposer / cache
/// call. No ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Root of the separate output tree. None means converted artifacts are
    /// stored co-located, beside their sources under the cache subdirectory.
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// Path prefix stripped from source paths before mirroring them under
    /// `output_root`. Ignored in co-located mode.
    #[serde(default)]
    pub strip_prefix: Option<String>,

    /// Rewrite existing cache entries and archive-entry files.
    #[serde(default)]
    pub overwrite: bool,

    /// Scrub markup from standalone HTML inputs. Mail bodies are always
    /// scrubbed regardless.
    #[serde(default = "default_true")]
    pub scrub_html: bool,

    /// Container nesting bound (mail-in-mail, archive-in-archive). Parts
    /// beyond this depth are logged and not walked.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Cap on extracted text per document, in bytes. Exceeding it is the
    /// distinguishable "truncated" extraction failure.
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            strip_prefix: None,
            overwrite: false,
            scrub_html: default_true(),
            max_depth: default_max_depth(),
            max_text_bytes: default_max_text_bytes(),
            archive: ArchiveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Glob patterns for archive entries that are never extracted.
    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            exclude: default_excludes(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    vec![
        "**/.DS_Store".into(),
        "**/__MACOSX/**".into(),
        "**/Thumbs.db".into(),
        "**/.git/**".into(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    20
}

fn default_max_text_bytes() -> usize {
    0x100000 // 1 MiB of text from a given document
}
