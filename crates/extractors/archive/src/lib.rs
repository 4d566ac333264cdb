//! Archive traversal: streams zip / tar / gzip-wrapped-tar entries into a
//! working directory and hands each materialized file to a caller-supplied
//! conversion callback.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use unfurl_common::error::ConvertError;

/// Archive kinds handled here, detected by file-extension convention (no
/// content sniffing). `.gz`/`.tgz` are assumed to wrap a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

pub fn detect_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
        return Some(ArchiveKind::TarGz);
    }
    if name.ends_with(".tar") {
        return Some(ArchiveKind::Tar);
    }
    if name.ends_with(".zip") {
        return Some(ArchiveKind::Zip);
    }
    None
}

/// Check if a file is an archive this navigator can unpack.
pub fn accepts(path: &Path) -> bool {
    detect_kind(path).is_some()
}

/// Called once per materialized entry file, in stream order.
pub type EntryCallback<'a> = &'a mut dyn FnMut(&Path);

/// Caller-supplied exclusion predicate over entry names.
pub type ExcludeFilter<'a> = &'a dyn Fn(&str) -> bool;

pub struct ArchiveNavigator<'a> {
    working_dir: PathBuf,
    overwrite: bool,
    exclude: ExcludeFilter<'a>,
}

impl<'a> ArchiveNavigator<'a> {
    /// The working directory is not created here — it must already exist.
    pub fn new(working_dir: impl Into<PathBuf>, overwrite: bool, exclude: ExcludeFilter<'a>) -> Self {
        Self {
            working_dir: working_dir.into(),
            overwrite,
            exclude,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Unpack `archive` into the working directory, invoking `on_entry` for
    /// every materialized file. Unknown extensions are the typed
    /// unsupported-archive error; a failure on one entry is logged and
    /// skipped, not fatal to the archive.
    pub fn unpack(&self, archive: &Path, on_entry: EntryCallback<'_>) -> Result<(), ConvertError> {
        if !self.working_dir.is_dir() {
            return Err(ConvertError::Malformed(format!(
                "working directory {} does not exist",
                self.working_dir.display()
            )));
        }
        match detect_kind(archive) {
            Some(ArchiveKind::Zip) => self.unzip(archive, on_entry),
            Some(ArchiveKind::Tar) => self.untar(archive, on_entry),
            Some(ArchiveKind::TarGz) => {
                // Unwrap the gzip layer into an intermediate .tar first,
                // then run the tar pass over it.
                let tar_file = self.gunzip_to_tar(archive)?;
                self.untar(&tar_file, on_entry)
            }
            None => {
                let ext = archive
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("(none)");
                Err(ConvertError::UnsupportedArchive(ext.to_string()))
            }
        }
    }

    fn unzip(&self, zip_path: &Path, on_entry: EntryCallback<'_>) -> Result<(), ConvertError> {
        let file = File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ConvertError::Malformed(format!("opening zip: {e}")))?;

        for i in 0..archive.len() {
            let mut entry = match archive.by_index(i) {
                Ok(e) => e,
                Err(e) => {
                    warn!("zip: skipping entry {i}: {e}");
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if (self.exclude)(&name) {
                debug!("zip: excluded entry '{name}'");
                continue;
            }
            // enclosed_name rejects absolute and parent-escaping paths.
            let Some(rel) = entry.enclosed_name() else {
                warn!("zip: rejecting entry escaping working dir: '{name}'");
                continue;
            };
            let target = self.working_dir.join(rel);
            match self.materialize(&target, &mut entry) {
                Ok(()) => on_entry(&target),
                Err(e) => warn!("zip: unable to save entry '{name}': {e}"),
            }
        }
        Ok(())
    }

    fn untar(&self, tar_path: &Path, on_entry: EntryCallback<'_>) -> Result<(), ConvertError> {
        let file = File::open(tar_path)?;
        let mut archive = tar::Archive::new(BufReader::new(file));

        let entries = archive
            .entries()
            .map_err(|e| ConvertError::Malformed(format!("reading tar entries: {e}")))?;
        for entry_result in entries {
            let mut entry = match entry_result {
                Ok(e) => e,
                Err(e) => {
                    warn!("tar: skipping entry: {e}");
                    continue;
                }
            };
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let name = match entry.path() {
                Ok(p) => p.to_string_lossy().to_string(),
                Err(e) => {
                    warn!("tar: skipping entry with unreadable path: {e}");
                    continue;
                }
            };
            if (self.exclude)(&name) {
                debug!("tar: excluded entry '{name}'");
                continue;
            }
            let Some(target) = contained_join(&self.working_dir, &name) else {
                warn!("tar: rejecting entry escaping working dir: '{name}'");
                continue;
            };
            match self.materialize(&target, &mut entry) {
                Ok(()) => on_entry(&target),
                Err(e) => warn!("tar: unable to save entry '{name}': {e}"),
            }
        }
        Ok(())
    }

    /// Stream one entry to its target file. Existing targets are reused when
    /// overwrite is off.
    fn materialize(&self, target: &Path, reader: &mut dyn std::io::Read) -> std::io::Result<()> {
        if target.exists() && !self.overwrite {
            debug!("reusing existing entry file {}", target.display());
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(target)?);
        std::io::copy(reader, &mut out)?;
        Ok(())
    }

    fn gunzip_to_tar(&self, gz_path: &Path) -> Result<PathBuf, ConvertError> {
        let stem = gz_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("archive");
        let tar_name = if stem.to_lowercase().ends_with(".tar") {
            stem.to_string()
        } else {
            format!("{stem}.tar")
        };
        let tar_path = self.working_dir.join(tar_name);
        if tar_path.exists() && !self.overwrite {
            return Ok(tar_path);
        }
        let mut decoder = GzDecoder::new(BufReader::new(File::open(gz_path)?));
        let mut out = BufWriter::new(File::create(&tar_path)?);
        std::io::copy(&mut decoder, &mut out)?;
        Ok(tar_path)
    }
}

/// Join an untrusted entry path onto `root`, refusing anything that would
/// land outside it: absolute paths, drive prefixes, and `..` components.
pub fn contained_join(root: &Path, name: &str) -> Option<PathBuf> {
    let rel = Path::new(name);
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for comp in rel.components() {
        match comp {
            Component::Normal(part) => {
                out.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(out)
}
