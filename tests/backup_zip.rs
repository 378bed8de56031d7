#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("reportcard-backup-src");
    let workspace2 = temp_dir("reportcard-backup-dst");
    let out_dir = temp_dir("reportcard-backup-out");

    let db_src = workspace.join("reportcard.sqlite3");
    let bytes = b"sqlite-test-payload";
    std::fs::write(&db_src, bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.rcbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/reportcard.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("reportcard.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("reportcard-backup-legacy");
    let workspace = temp_dir("reportcard-backup-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let mut bytes = b"SQLite format 3\0".to_vec();
    bytes.extend_from_slice(b"legacy-sqlite-copy");
    std::fs::write(&legacy_file, &bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join("reportcard.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tampered_bundle_is_rejected() {
    let out_dir = temp_dir("reportcard-backup-tampered");
    let workspace = temp_dir("reportcard-backup-tampered-dst");
    let existing = workspace.join("reportcard.sqlite3");
    std::fs::write(&existing, b"keep-me").expect("write existing db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        zip.write_all(
            format!(
                "{{\"format\":\"{}\",\"version\":1,\"dbSha256\":\"{}\"}}",
                backup::BUNDLE_FORMAT_V1,
                "0".repeat(64)
            )
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/reportcard.sqlite3", opts).expect("db entry");
        zip.write_all(b"not-the-hashed-bytes").expect("write db");
        zip.finish().expect("finish zip");
    }

    let result = backup::import_workspace_bundle(&bundle_path, &workspace);
    let msg = format!("{:#}", result.err().expect("checksum mismatch must fail"));
    assert!(msg.contains("checksum mismatch"), "{}", msg);
    assert_eq!(std::fs::read(&existing).expect("read existing"), b"keep-me");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_sqlite_file_does_not_replace_workspace_db() {
    let out_dir = temp_dir("reportcard-backup-garbage");
    let workspace = temp_dir("reportcard-backup-garbage-dst");
    let existing = workspace.join("reportcard.sqlite3");
    std::fs::write(&existing, b"SQLite format 3\0original").expect("write existing db");

    for (name, contents) in [
        ("notes.txt", &b"just some notes, not a database"[..]),
        ("truncated.sqlite3", &b"SQLite for"[..]),
        ("empty.sqlite3", &b""[..]),
    ] {
        let path = out_dir.join(name);
        std::fs::write(&path, contents).expect("write input file");
        let result = backup::import_workspace_bundle(&path, &workspace);
        assert!(result.is_err(), "{} must be rejected", name);
        assert_eq!(
            std::fs::read(&existing).expect("read existing"),
            b"SQLite format 3\0original",
            "{} clobbered the database",
            name
        );
    }
    assert!(!workspace.join("reportcard.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
