#[path = "../src/backup.rs"]
mod backup;
#[path = "../src/db.rs"]
mod db;

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
    let workspace = temp_dir("rosterd-zip-src");
    let workspace2 = temp_dir("rosterd-zip-dst");
    let out_dir = temp_dir("rosterd-zip-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join(db::DB_FILE_NAME), bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT_V1);
    assert_eq!(manifest["dbSha256"], export.db_sha256.as_str());

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join(db::DB_FILE_NAME)).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_refused() {
    let out_dir = temp_dir("rosterd-zip-tampered");
    let workspace = temp_dir("rosterd-zip-tampered-dst");
    let original = b"original-db";
    std::fs::write(workspace.join(db::DB_FILE_NAME), original).expect("write existing db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        zip.write_all(
            serde_json::json!({
                "format": backup::BUNDLE_FORMAT_V1,
                "version": 1,
                "dbSha256": "00".repeat(32)
            })
            .to_string()
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/rosterd.sqlite3", opts).expect("db entry");
        zip.write_all(b"swapped-db").expect("write db");
        zip.finish().expect("finish zip");
    }

    let result = backup::import_workspace_bundle(&bundle_path, &workspace);
    let message = format!("{:#}", result.expect_err("checksum mismatch"));
    assert!(message.contains("checksum mismatch"), "{}", message);

    let kept = std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read kept db");
    assert_eq!(kept, original);
    assert!(!workspace
        .join(format!("{}.importing", db::DB_FILE_NAME))
        .exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn foreign_bundle_format_is_refused() {
    let out_dir = temp_dir("rosterd-zip-foreign");
    let workspace = temp_dir("rosterd-zip-foreign-dst");

    let bundle_path = out_dir.join("other-app.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("manifest entry");
        zip.write_all(br#"{"format":"gradebook-export-v2","version":2}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }

    let result = backup::import_workspace_bundle(&bundle_path, &workspace);
    let message = format!("{:#}", result.expect_err("foreign format"));
    assert!(message.contains("unsupported bundle format"), "{}", message);
    assert!(!workspace.join(db::DB_FILE_NAME).exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("rosterd-zip-legacy");
    let workspace = temp_dir("rosterd-zip-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let bytes = b"legacy-sqlite-copy";
    std::fs::write(&legacy_file, bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
