//! End-to-end conversion tests: real files on disk, through routing, cache,
//! and child recursion.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use unfurl_cache::PathManager;
use unfurl_client::convert::{convert_and_cache, convert_tree};
use unfurl_client::listener::LogListener;
use unfurl_common::config::ConvertConfig;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, bytes) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *bytes).unwrap();
    }
    builder.into_inner().unwrap()
}

fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(path).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(&tar_bytes(entries)).unwrap();
    encoder.finish().unwrap();
}

#[test]
fn test_text_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("note.txt"), "hello from a file\n").unwrap();

    let mut listener = LogListener::default();
    convert_tree(dir.path(), &ConvertConfig::default(), &mut listener).unwrap();

    assert_eq!(listener.converted, 1);
    assert_eq!(listener.failed, 0);
    let cached = dir.path().join("unfurl/note.txt.txt");
    assert_eq!(
        std::fs::read_to_string(cached).unwrap(),
        "hello from a file"
    );
    assert!(dir.path().join("unfurl/note.txt.json").exists());
}

#[test]
fn test_nested_archive_reachable_through_two_stages() {
    let dir = tempfile::tempdir().unwrap();

    // outer.zip → bundle.tar.gz → readme.txt
    let tgz = dir.path().join("bundle.tar.gz");
    write_tar_gz(&tgz, &[("readme.txt", b"deep text")]);
    let outer = dir.path().join("outer.zip");
    write_zip(&outer, &[("bundle.tar.gz", &std::fs::read(&tgz).unwrap())]);
    std::fs::remove_file(&tgz).unwrap();

    let pm = PathManager::new(ConvertConfig::default());
    let doc = convert_and_cache(&outer, &pm, 0).unwrap();

    assert!(doc.is_converted);
    assert_eq!(doc.children.len(), 1, "one entry in the outer zip");
    let inner = &doc.children[0];
    assert!(inner.filename().unwrap().ends_with("bundle.tar.gz"));
    assert_eq!(inner.children.len(), 1, "one file inside the tarball");
    let leaf = &inner.children[0];
    assert_eq!(leaf.text, "deep text");

    // The innermost conversion has its own cache entry on disk.
    let leaf_cache = dir
        .path()
        .join("outer/bundle.tar/unfurl/readme.txt.txt");
    assert_eq!(std::fs::read_to_string(leaf_cache).unwrap(), "deep text");
}

#[test]
fn test_mail_attachment_materialized_and_converted() {
    let dir = tempfile::tempdir().unwrap();
    let eml = dir.path().join("status.eml");
    let msg = concat!(
        "From: alice@example.com\r\n",
        "Subject: status\r\n",
        "Message-ID: <st.1@example.com>\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "Main body.\r\n",
        "--b\r\n",
        "Content-Type: text/plain; charset=\"utf-8\"\r\n",
        "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
        "\r\n",
        "attached words\r\n",
        "--b--\r\n",
    );
    std::fs::write(&eml, msg).unwrap();

    let pm = PathManager::new(ConvertConfig::default());
    let doc = convert_and_cache(&eml, &pm, 0).unwrap();

    assert!(doc.is_converted);
    assert!(doc.text.contains("Main body."));
    assert_eq!(doc.id, "st_1");
    assert_eq!(doc.raw_children.len(), 1);

    // The attachment was written out and then converted on its own.
    let att = dir.path().join("status/notes.txt");
    assert_eq!(
        std::fs::read_to_string(&att).unwrap().trim_end(),
        "attached words"
    );
    assert_eq!(doc.children.len(), 1);
    assert_eq!(doc.children[0].text.trim_end(), "attached words");
    assert!(dir.path().join("status/unfurl/notes.txt.txt").exists());
}

#[test]
fn test_second_run_serves_cache_without_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("doc.txt");
    std::fs::write(&source, "original text").unwrap();
    let mtime = filetime::FileTime::from_last_modification_time(
        &std::fs::metadata(&source).unwrap(),
    );

    let pm = PathManager::new(ConvertConfig::default());
    let first = convert_and_cache(&source, &pm, 0).unwrap();
    assert_eq!(first.text, "original text");

    let text_path = pm.cache_path_for(&source);
    let cached_bytes = std::fs::read(&text_path).unwrap();
    let meta_bytes = std::fs::read(pm.meta_path_for(&source)).unwrap();

    // Swap the source content but keep its mtime: a second run must come
    // entirely from the cache, never re-reading the source.
    std::fs::write(&source, "tampered").unwrap();
    filetime::set_file_mtime(&source, mtime).unwrap();

    let second = convert_and_cache(&source, &pm, 0).unwrap();
    assert_eq!(second.text, "original text");
    assert_eq!(second.id, first.id);
    assert_eq!(std::fs::read(&text_path).unwrap(), cached_bytes);
    assert_eq!(std::fs::read(pm.meta_path_for(&source)).unwrap(), meta_bytes);
}

#[test]
fn test_unsupported_binary_returned_unconverted() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("img.png");
    std::fs::write(&source, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();

    let pm = PathManager::new(ConvertConfig::default());
    let doc = convert_and_cache(&source, &pm, 0).unwrap();

    assert!(!doc.is_converted);
    assert!(doc
        .property("conversion-error")
        .unwrap()
        .contains("image/png"));
    assert!(!pm.cache_path_for(&source).exists());
}

#[test]
fn test_archive_exclusions_applied() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("a.zip");
    write_zip(
        &archive,
        &[(".DS_Store", b"junk"), ("real.txt", b"content")],
    );

    let pm = PathManager::new(ConvertConfig::default());
    let doc = convert_and_cache(&archive, &pm, 0).unwrap();

    assert_eq!(doc.property("archive:entries"), Some("1"));
    assert_eq!(doc.children.len(), 1);
    assert!(!dir.path().join("a/.DS_Store").exists());
}
