//! Top-level conversion routing: pick the right engine for a source file
//! (mail decomposer, archive navigator, or the plain extraction adapter),
//! serve and fill the conversion cache, and recurse into extracted children.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use unfurl_cache::PathManager;
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::{ConvertError, ExtractError, Result};
use unfurl_common::model::{ConvertedDocument, Extraction};
use unfurl_extract_archive::ArchiveNavigator;
use unfurl_extract_mail::MessageDecomposer;

use crate::crawl;
use crate::listener::ConversionListener;

/// Convert everything under `root` (or the single file it names), notifying
/// the listener once per top-level source.
pub fn convert_tree(
    root: &Path,
    cfg: &ConvertConfig,
    listener: &mut dyn ConversionListener,
) -> Result<()> {
    let pm = PathManager::new(cfg.clone());
    let files = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        crawl::walk_files(root)
    };

    for file in files {
        if !pm.is_cacheable(&file) {
            debug!("skipping cache artifact {}", file.display());
            continue;
        }
        match convert_and_cache(&file, &pm, 0) {
            Ok(doc) => listener.on_converted(&file, &doc),
            Err(e) => listener.on_failed(&file, &e),
        }
    }
    Ok(())
}

/// Convert one source file. The cache is consulted first; on a miss the file
/// is converted, persisted, and any raw children it produced are converted
/// in turn (each with its own cache entry).
pub fn convert_and_cache(
    source: &Path,
    pm: &PathManager,
    depth: usize,
) -> Result<ConvertedDocument> {
    if let Some(doc) = pm.get_cached(source)? {
        debug!("cache hit for {}", source.display());
        return Ok(doc);
    }

    let mut doc = convert_file(source, pm, depth)?;
    doc.ensure_default_id();

    if doc.is_converted {
        pm.persist(&doc)?;
        convert_raw_children(&mut doc, pm, depth);
    }
    Ok(doc)
}

/// Route a file to its conversion engine. Adapter failures other than I/O
/// come back as an unconverted document carrying the failure reason — a
/// file the adapter cannot handle is an outcome, not an error.
fn convert_file(source: &Path, pm: &PathManager, depth: usize) -> Result<ConvertedDocument> {
    let cfg = pm.config();

    if unfurl_extract_mail::accepts(source) {
        return MessageDecomposer::new(cfg.clone()).convert_file(source);
    }
    if unfurl_extract_archive::accepts(source) {
        return convert_archive(source, pm, depth);
    }

    match unfurl_extract_dispatch::extract_path(source, cfg) {
        Ok(ex) => Ok(document_from_extraction(source, ex)),
        Err(ExtractError::Io(e)) => Err(e.into()),
        Err(e) => {
            match e {
                ExtractError::Unsupported(_) => {
                    debug!("no text in {}: {e}", source.display())
                }
                _ => warn!("extraction failed for {}: {e}", source.display()),
            }
            let mut doc = ConvertedDocument::new(Some(source));
            doc.set_property("conversion-error", e.to_string());
            Ok(doc)
        }
    }
}

/// Unpack an archive into its working directory and convert every
/// materialized entry. The archive's own document carries no text; the
/// converted entries hang off it as children.
fn convert_archive(source: &Path, pm: &PathManager, depth: usize) -> Result<ConvertedDocument> {
    let cfg = pm.config();
    let mut doc = ConvertedDocument::new(Some(source));

    if depth >= cfg.max_depth {
        warn!(
            "archive nesting exceeds {}, not unpacked: {}",
            cfg.max_depth,
            source.display()
        );
        doc.set_property("archive:skipped", "nesting limit");
        return Ok(doc);
    }

    let workdir = pm.children_dir_for(source);
    std::fs::create_dir_all(&workdir)?;

    let excludes = build_globset(&cfg.archive.exclude)?;
    let exclude = |name: &str| excludes.is_match(name);
    let nav = ArchiveNavigator::new(&workdir, cfg.overwrite, &exclude);

    let mut entries = 0usize;
    let mut converted: Vec<ConvertedDocument> = Vec::new();
    nav.unpack(source, &mut |entry: &Path| {
        entries += 1;
        if !pm.is_cacheable(entry) {
            return;
        }
        match convert_and_cache(entry, pm, depth + 1) {
            Ok(child) => converted.push(child),
            Err(e) => warn!("entry conversion failed for {}: {e}", entry.display()),
        }
    })?;

    doc.set_property("archive:entries", entries.to_string());
    doc.children = converted;
    doc.is_converted = true;
    Ok(doc)
}

/// Convert the files `persist` just wrote for a document's raw children and
/// attach the results as converted children. A failing child is logged and
/// left out; the parent stays converted.
fn convert_raw_children(doc: &mut ConvertedDocument, pm: &PathManager, depth: usize) {
    let Some(source) = doc.source_path.clone() else {
        return;
    };
    if doc.raw_children.is_empty() || depth >= pm.config().max_depth {
        return;
    }

    let ids: Vec<String> = doc.raw_children.iter().map(|c| c.id.clone()).collect();
    for id in ids {
        let path = pm.child_path_for(&source, &id);
        if !path.is_file() || !pm.is_cacheable(&path) {
            continue;
        }
        match convert_and_cache(&path, pm, depth + 1) {
            Ok(child_doc) => doc.add_child(child_doc),
            Err(e) => warn!("child conversion failed for {}: {e}", path.display()),
        }
    }
}

fn document_from_extraction(source: &Path, ex: Extraction) -> ConvertedDocument {
    let mut doc = ConvertedDocument::new(Some(source));
    doc.text = ex.text;
    doc.encoding = ex.encoding;
    doc.properties = ex.properties;
    doc.is_converted = true;
    doc
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)
            .map_err(|e| ConvertError::Malformed(format!("bad exclude pattern '{pat}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConvertError::Malformed(format!("building exclude set: {e}")))
}
