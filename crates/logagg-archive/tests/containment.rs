//! Extraction containment and post-processing tests.

use flate2::write::GzEncoder;
use flate2::Compression;
use logagg_archive::{
    rename_extracted_directory, sanitize_entry_path, unzip_secondary_logs, ArchiveError,
    ArchiveExtractor,
};
use proptest::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Component, Path};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

/// Header whose name bytes bypass tar's own path validation.
fn raw_header(name: &[u8], entry_type: EntryType, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_entry_type(entry_type);
    header
}

fn append_file(builder: &mut Builder<Vec<u8>>, name: &str, data: &[u8]) {
    let mut header = raw_header(name.as_bytes(), EntryType::Regular, data.len() as u64);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

fn append_dir(builder: &mut Builder<Vec<u8>>, name: &str) {
    let mut header = raw_header(name.as_bytes(), EntryType::Directory, 0);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append(&header, std::io::empty()).unwrap();
}

fn append_link(builder: &mut Builder<Vec<u8>>, name: &str, kind: EntryType, target: &str) {
    let mut header = raw_header(name.as_bytes(), kind, 0);
    header.as_old_mut().linkname[..target.len()].copy_from_slice(target.as_bytes());
    header.set_cksum();
    builder.append(&header, std::io::empty()).unwrap();
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Deterministic, poorly compressible bytes.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}

fn files_under(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
    }
    out.sort();
    out
}

#[test]
fn test_traversal_entries_never_escape() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    let archive = dir.path().join("evil.tar");

    let mut builder = Builder::new(Vec::new());
    append_dir(&mut builder, "serverA/");
    append_file(&mut builder, "../../etc/passwd", b"owned");
    append_file(&mut builder, "serverA/var/log/../../../../escape.log", b"owned");
    append_file(&mut builder, "/tmp/absolute.log", b"owned");
    append_link(&mut builder, "serverA/var/log/link", EntryType::Symlink, "/etc/passwd");
    append_link(&mut builder, "serverA/var/log/hard", EntryType::Link, "../../etc/passwd");
    append_file(&mut builder, "serverA/var/log/app.log", b"ok");
    fs::write(&archive, builder.into_inner().unwrap()).unwrap();

    let report = ArchiveExtractor::new(["var/log"])
        .unpack_with_report(&archive, &root)
        .unwrap();

    assert_eq!(report.name, "serverA");
    assert_eq!(report.files_written, 1);
    assert_eq!(report.rejected_unsafe, 3);
    assert_eq!(report.skipped_non_regular, 2);
    assert_eq!(files_under(&root), vec!["serverA/var/log/app.log"]);
    assert_eq!(files_under(dir.path()), vec!["data/serverA/var/log/app.log", "evil.tar"]);
}

#[test]
fn test_only_allowed_subtree_is_extracted() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    let archive = dir.path().join("serverA.tgz");

    let mut builder = Builder::new(Vec::new());
    append_dir(&mut builder, "serverA/");
    append_file(&mut builder, "serverA/var/log/app.log", b"application log");
    append_file(&mut builder, "serverA/etc/config.yaml", b"secret: 1");
    append_file(&mut builder, "serverA/home/user/.bashrc", b"alias");
    fs::write(&archive, gzip(&builder.into_inner().unwrap())).unwrap();

    let name = ArchiveExtractor::new(["var/log"])
        .unpack(&archive, &root)
        .unwrap();

    assert_eq!(name, "serverA");
    assert_eq!(files_under(&root), vec!["serverA/var/log/app.log"]);
    assert_eq!(
        fs::read(root.join("serverA/var/log/app.log")).unwrap(),
        b"application log"
    );
}

#[test]
fn test_corfu_scenario_unpack_and_rename() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data/corfu-run-42");
    let archive = dir.path().join("archives/corfu-run-42/server1.tgz");
    fs::create_dir_all(archive.parent().unwrap()).unwrap();

    let mut builder = Builder::new(Vec::new());
    append_file(&mut builder, "server1/var/log/corfu/corfu.log", b"hello");
    append_file(&mut builder, "server1/var/log/syslog", b"not allowed");
    fs::write(&archive, gzip(&builder.into_inner().unwrap())).unwrap();

    let name = ArchiveExtractor::new(["var/log/corfu"])
        .unpack(&archive, &data)
        .unwrap();
    rename_extracted_directory(&data, &name, "server1").unwrap();

    assert_eq!(
        fs::read_to_string(data.join("server1/var/log/corfu/corfu.log")).unwrap(),
        "hello"
    );
    assert!(!data.join("server1/var/log/syslog").exists());
}

#[test]
fn test_truncated_tar_fails_and_removes_partial_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("data");
    let archive = dir.path().join("cut.tar");

    let mut builder = Builder::new(Vec::new());
    append_file(&mut builder, "s/var/log/big.log", &noise(10_000));
    let mut bytes = builder.into_inner().unwrap();
    bytes.truncate(512 + 3_000);
    fs::write(&archive, bytes).unwrap();

    let err = ArchiveExtractor::new(["var/log"])
        .unpack(&archive, &root)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Truncated(_)), "{err:?}");
    assert!(!root.join("s/var/log/big.log").exists());
}

#[test]
fn test_truncated_tgz_fails() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("cut.tgz");

    let mut builder = Builder::new(Vec::new());
    append_file(&mut builder, "s/var/log/big.log", &noise(300_000));
    let mut bytes = gzip(&builder.into_inner().unwrap());
    let half = bytes.len() / 2;
    bytes.truncate(half);
    fs::write(&archive, bytes).unwrap();

    let err = ArchiveExtractor::new(["var/log"])
        .unpack(&archive, &dir.path().join("data"))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Truncated(_)), "{err:?}");
}

#[test]
fn test_non_gzip_tgz_is_malformed() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("fake.tgz");
    fs::write(&archive, b"this is plain text, not a gzip stream at all").unwrap();

    let err = ArchiveExtractor::new(["var/log"])
        .unpack(&archive, &dir.path().join("data"))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Malformed(_)), "{err:?}");
}

#[test]
fn test_zip_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("server1.zip");
    fs::write(&archive, b"PK\x03\x04").unwrap();

    let err = ArchiveExtractor::new(["var/log"])
        .unpack(&archive, &dir.path().join("data"))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
}

#[test]
fn test_rename_twice_leaves_one_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("serverA/var/log")).unwrap();

    rename_extracted_directory(dir.path(), "serverA", "server1").unwrap();
    rename_extracted_directory(dir.path(), "serverA", "server1").unwrap();
    rename_extracted_directory(dir.path(), "server1", "server1").unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["server1"]);
    assert!(dir.path().join("server1/var/log").is_dir());
}

#[test]
fn test_gunzip_continues_past_corrupt_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.log.gz"), gzip(b"first")).unwrap();
    fs::write(dir.path().join("b.log.gz"), b"definitely not gzip").unwrap();
    fs::write(dir.path().join("c.log.gz"), gzip(b"third")).unwrap();
    fs::write(dir.path().join("current.log"), b"live").unwrap();

    let report = unzip_secondary_logs(dir.path()).unwrap();

    assert_eq!(
        report.decompressed,
        vec![dir.path().join("a.log"), dir.path().join("c.log")]
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dir.path().join("b.log.gz"));

    assert_eq!(fs::read(dir.path().join("a.log")).unwrap(), b"first");
    assert_eq!(fs::read(dir.path().join("c.log")).unwrap(), b"third");
    assert!(dir.path().join("b.log.gz").exists());
    assert!(!dir.path().join("b.log").exists());
    assert!(!dir.path().join("b.log.partial").exists());
    assert!(!dir.path().join("a.log.gz").exists());
}

fn component_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["..", ".", "", "serverA", "var", "log", "/", "a.log", "\u{1b}x"])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn sanitized_paths_stay_relative(parts in prop::collection::vec(component_strategy(), 0..8)) {
        let raw = parts.join("/");
        if let Ok(clean) = sanitize_entry_path(Path::new(&raw)) {
            prop_assert!(!clean.as_os_str().is_empty());
            for component in clean.components() {
                prop_assert!(
                    matches!(component, Component::Normal(_)),
                    "{:?} from {:?}",
                    clean,
                    raw
                );
            }
            let root = Path::new("/dest/root");
            prop_assert!(root.join(&clean).starts_with(root));
        }
    }
}
