//! Conversion cache and path management: maps every source file to a
//! deterministic location for its converted text + metadata, decides
//! cache-hit vs reconvert, and persists conversion results.
//!
//! Two placement modes:
//! - co-located: artifacts live beside the source under a fixed
//!   subdirectory (`<parent>/unfurl/<name>.txt` + `<name>.json`); children
//!   pulled out of a compound document land in `<parent>/<stem>/`.
//! - separate tree: the source's path (optionally with a configured prefix
//!   stripped) is mirrored under an output root; sources that already live
//!   inside the output root (materialized archive entries, saved
//!   attachments) fall back to co-located placement beside themselves.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::{ConvertError, Result};
use unfurl_common::model::ConvertedDocument;
use unfurl_common::naming::safe_child_filename;

/// Fixed name of the co-located cache subdirectory. Also the marker that a
/// path holds conversion output and must never be converted again.
pub const CACHE_DIR: &str = "unfurl";

pub const TEXT_EXT: &str = "txt";
pub const META_EXT: &str = "json";

pub struct PathManager {
    cfg: ConvertConfig,
}

impl PathManager {
    pub fn new(cfg: ConvertConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.cfg
    }

    /// Directory that holds the converted text + sidecar for `source`.
    pub fn cache_dir_for(&self, source: &Path) -> PathBuf {
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        match &self.cfg.output_root {
            Some(root) if !source.starts_with(root) => {
                root.join(self.mirrored_rel(parent))
            }
            _ => parent.join(CACHE_DIR),
        }
    }

    /// Deterministic location of the converted text for `source`.
    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        self.cache_dir_for(source)
            .join(format!("{}.{}", basename(source), TEXT_EXT))
    }

    /// Sidecar metadata path next to the converted text.
    pub fn meta_path_for(&self, source: &Path) -> PathBuf {
        self.cache_dir_for(source)
            .join(format!("{}.{}", basename(source), META_EXT))
    }

    /// Per-parent directory where a compound document's extracted children
    /// are materialized.
    pub fn children_dir_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("item");
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        match &self.cfg.output_root {
            Some(root) if !source.starts_with(root) => {
                root.join(self.mirrored_rel(parent)).join(stem)
            }
            _ => parent.join(stem),
        }
    }

    /// Where one raw child of `source` is materialized (post safe-naming).
    pub fn child_path_for(&self, source: &Path, child_id: &str) -> PathBuf {
        self.children_dir_for(source).join(safe_child_filename(child_id))
    }

    /// False for paths inside a cache subdirectory — conversion output is
    /// never itself converted.
    pub fn is_cacheable(&self, source: &Path) -> bool {
        !source
            .components()
            .any(|c| matches!(c, Component::Normal(n) if n == CACHE_DIR))
    }

    /// Load the cached conversion for `source`, if one exists, is complete,
    /// and the source has not changed since. Never triggers reconversion.
    pub fn get_cached(&self, source: &Path) -> Result<Option<ConvertedDocument>> {
        if self.cfg.overwrite {
            return Ok(None);
        }
        let text_path = self.cache_path_for(source);
        let meta_path = self.meta_path_for(source);
        if !text_path.is_file() || !meta_path.is_file() {
            return Ok(None);
        }
        if source_newer(source, &text_path) {
            debug!("cache stale for {}", source.display());
            return Ok(None);
        }
        let mut doc: ConvertedDocument = serde_json::from_slice(&fs::read(&meta_path)?)?;
        doc.text = fs::read_to_string(&text_path)?;
        doc.is_converted = true;
        if doc.source_path.is_none() {
            doc.source_path = Some(source.to_path_buf());
        }
        Ok(Some(doc))
    }

    /// Write the document's text and metadata sidecar, plus files for every
    /// raw child, at their computed cache locations. Existing entries are
    /// skipped unless overwrite is on. Returns the text path.
    ///
    /// Each file goes through a temp-file-then-rename so a crash mid-write
    /// never leaves a partial entry behind.
    pub fn persist(&self, doc: &ConvertedDocument) -> Result<PathBuf> {
        let source = doc.source_path.as_deref().ok_or_else(|| {
            ConvertError::Malformed("cannot persist a document without a source path".into())
        })?;

        let text_path = self.cache_path_for(source);
        let meta_path = self.meta_path_for(source);
        let dir = text_path
            .parent()
            .ok_or_else(|| ConvertError::Malformed("cache path has no parent".into()))?;

        // Rewrite when either half is missing so an incomplete entry heals.
        if self.cfg.overwrite || !text_path.exists() || !meta_path.exists() {
            fs::create_dir_all(dir)?;
            atomic_write(dir, &text_path, doc.text.as_bytes())?;
            let meta = serde_json::to_vec_pretty(doc)?;
            atomic_write(dir, &meta_path, &meta)?;
        } else {
            debug!("cache entry exists, skipping {}", text_path.display());
        }

        if !doc.raw_children.is_empty() {
            let children_dir = self.children_dir_for(source);
            fs::create_dir_all(&children_dir)?;
            for child in &doc.raw_children {
                let target = children_dir.join(safe_child_filename(&child.id));
                if target.exists() && !self.cfg.overwrite {
                    continue;
                }
                atomic_write(&children_dir, &target, &child.bytes)?;
            }
        }

        Ok(text_path)
    }

    /// Mirror a source directory into the output tree, minus the configured
    /// prefix and any root/drive components.
    fn mirrored_rel(&self, dir: &Path) -> PathBuf {
        let mut rel = dir;
        if let Some(prefix) = &self.cfg.strip_prefix {
            if let Ok(stripped) = dir.strip_prefix(prefix) {
                rel = stripped;
            }
        }
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("item")
        .to_string()
}

fn source_newer(source: &Path, cached: &Path) -> bool {
    let (Ok(src), Ok(dst)) = (fs::metadata(source), fs::metadata(cached)) else {
        return false;
    };
    match (src.modified(), dst.modified()) {
        (Ok(a), Ok(b)) => a > b,
        _ => false,
    }
}

fn atomic_write(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(target).map_err(|e| ConvertError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unfurl_common::model::RawContent;

    fn doc_for(source: &Path, text: &str) -> ConvertedDocument {
        let mut doc = ConvertedDocument::new(Some(source));
        doc.text = text.to_string();
        doc.encoding = Some("utf-8".into());
        doc.set_title("t");
        doc.is_converted = true;
        doc.ensure_default_id();
        doc
    }

    #[test]
    fn test_colocated_paths() {
        let pm = PathManager::new(ConvertConfig::default());
        let source = Path::new("/data/in/report.pdf");
        assert_eq!(
            pm.cache_path_for(source),
            PathBuf::from("/data/in/unfurl/report.pdf.txt")
        );
        assert_eq!(
            pm.meta_path_for(source),
            PathBuf::from("/data/in/unfurl/report.pdf.json")
        );
        assert_eq!(
            pm.children_dir_for(source),
            PathBuf::from("/data/in/report")
        );
    }

    #[test]
    fn test_separate_tree_paths_with_prefix_strip() {
        let cfg = ConvertConfig {
            output_root: Some(PathBuf::from("/out")),
            strip_prefix: Some("/data".into()),
            ..Default::default()
        };
        let pm = PathManager::new(cfg);
        let source = Path::new("/data/in/report.pdf");
        assert_eq!(
            pm.cache_path_for(source),
            PathBuf::from("/out/in/report.pdf.txt")
        );
        assert_eq!(pm.children_dir_for(source), PathBuf::from("/out/in/report"));
    }

    #[test]
    fn test_sources_inside_output_root_colocate() {
        let cfg = ConvertConfig {
            output_root: Some(PathBuf::from("/out")),
            ..Default::default()
        };
        let pm = PathManager::new(cfg);
        let entry = Path::new("/out/in/bundle/entry.txt");
        assert_eq!(
            pm.cache_path_for(entry),
            PathBuf::from("/out/in/bundle/unfurl/entry.txt.txt")
        );
    }

    #[test]
    fn test_is_cacheable() {
        let pm = PathManager::new(ConvertConfig::default());
        assert!(pm.is_cacheable(Path::new("/data/in/report.pdf")));
        assert!(!pm.is_cacheable(Path::new("/data/in/unfurl/report.pdf.txt")));
        assert!(!pm.is_cacheable(Path::new("/data/unfurl/deep/file.txt")));
    }

    #[test]
    fn test_persist_then_get_cached_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, "irrelevant").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        let mut doc = doc_for(&source, "converted text");
        doc.set_property("mail:subject", "s");

        let text_path = pm.persist(&doc).unwrap();
        assert!(text_path.ends_with("unfurl/note.txt.txt"));

        let cached = pm.get_cached(&source).unwrap().expect("cache hit");
        assert_eq!(cached.text, "converted text");
        assert_eq!(cached.id, doc.id);
        assert_eq!(cached.property("mail:subject"), Some("s"));
        assert!(cached.is_converted);
    }

    #[test]
    fn test_second_persist_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, "src").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        let text_path = pm.persist(&doc_for(&source, "first run")).unwrap();

        // A second conversion attempt must leave the entry untouched.
        pm.persist(&doc_for(&source, "second run")).unwrap();
        assert_eq!(std::fs::read_to_string(&text_path).unwrap(), "first run");

        let pm = PathManager::new(ConvertConfig {
            overwrite: true,
            ..Default::default()
        });
        pm.persist(&doc_for(&source, "second run")).unwrap();
        assert_eq!(std::fs::read_to_string(&text_path).unwrap(), "second run");
    }

    #[test]
    fn test_newer_source_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, "src").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        pm.persist(&doc_for(&source, "cached")).unwrap();
        assert!(pm.get_cached(&source).unwrap().is_some());

        // Touch the source into the future: the entry goes stale.
        let later = filetime::FileTime::from_unix_time(
            filetime::FileTime::now().unix_seconds() + 60,
            0,
        );
        filetime::set_file_mtime(&source, later).unwrap();
        assert!(pm.get_cached(&source).unwrap().is_none());
    }

    #[test]
    fn test_overwrite_mode_never_serves_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, "src").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        pm.persist(&doc_for(&source, "cached")).unwrap();

        let pm = PathManager::new(ConvertConfig {
            overwrite: true,
            ..Default::default()
        });
        assert!(pm.get_cached(&source).unwrap().is_none());
    }

    #[test]
    fn test_children_persisted_under_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mail.eml");
        std::fs::write(&source, "src").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        let mut doc = doc_for(&source, "body");
        doc.add_raw_child(RawContent {
            id: "weird name?.doc".into(),
            bytes: b"attachment bytes".to_vec(),
            ..Default::default()
        });
        pm.persist(&doc).unwrap();

        let child = pm.child_path_for(&source, "weird name?.doc");
        assert_eq!(child, dir.path().join("mail").join("weird_name.doc"));
        assert_eq!(std::fs::read(&child).unwrap(), b"attachment bytes");
    }

    #[test]
    fn test_sidecar_keeps_property_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, "src").unwrap();

        let pm = PathManager::new(ConvertConfig::default());
        let mut doc = doc_for(&source, "text");
        doc.set_property("mail:zeta", "1");
        doc.set_property("mail:alpha", "2");
        pm.persist(&doc).unwrap();

        let raw = std::fs::read_to_string(pm.meta_path_for(&source)).unwrap();
        let zeta = raw.find("mail:zeta").unwrap();
        let alpha = raw.find("mail:alpha").unwrap();
        assert!(zeta < alpha, "insertion order must survive persistence");
    }
}
