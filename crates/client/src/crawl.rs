use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use unfurl_cache::CACHE_DIR;

/// Collect every regular file under `root`, skipping cache subdirectories so
/// conversion output is never fed back in. The list is fully materialized
/// before conversion starts — files created during a run are not picked up
/// until the next one.
pub fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != std::ffi::OsStr::new(CACHE_DIR))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("walk error: {e}");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files
}
