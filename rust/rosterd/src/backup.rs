use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/rosterd.sqlite3";
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
pub const BUNDLE_FORMAT_V1: &str = "rosterd-workspace-v1";
pub const LEGACY_SQLITE_FORMAT: &str = "legacy-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

/// First entry of every bundle.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    exported_at: Option<String>,
    /// Older bundles may lack it; then the entry is taken as is.
    #[serde(default)]
    db_sha256: Option<String>,
}

impl Manifest {
    fn for_db(db_sha256: String) -> Self {
        Self {
            format: BUNDLE_FORMAT_V1.to_string(),
            version: 1,
            app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            exported_at: Some(chrono::Utc::now().to_rfc3339()),
            db_sha256: Some(db_sha256),
        }
    }
}

/// Streams `reader` into `writer` and returns the lowercase hex SHA-256.
fn copy_hashed(reader: &mut impl Read, writer: &mut impl Write) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn create(path: &Path) -> anyhow::Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    ensure!(
        db_path.is_file(),
        "workspace database not found: {}",
        db_path.display()
    );
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    // The manifest leads the archive, so hash before writing anything.
    let db_sha256 = copy_hashed(&mut open(&db_path)?, &mut std::io::sink())
        .with_context(|| format!("failed to hash {}", db_path.display()))?;
    let manifest =
        serde_json::to_vec_pretty(&Manifest::for_db(db_sha256.clone())).context("manifest")?;

    let mut zip = ZipWriter::new(create(out_path)?);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(MANIFEST_ENTRY, opts)?;
    zip.write_all(&manifest).context("failed to write manifest entry")?;
    zip.start_file(DB_ENTRY, opts)?;
    std::io::copy(&mut open(&db_path)?, &mut zip).context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256,
    })
}

/// Restores a bundle (or a bare legacy SQLite file) into `workspace_path`.
/// The live database is replaced only after the extracted copy checks out.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    let dst = workspace_path.join(DB_FILE_NAME);

    if !is_zip_file(in_path)? {
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy legacy sqlite backup {} to {}",
                in_path.display(),
                dst.display()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: LEGACY_SQLITE_FORMAT.to_string(),
        });
    }

    let mut archive = ZipArchive::new(open(in_path)?).context("invalid zip archive")?;
    let manifest: Manifest = {
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle missing manifest.json")?;
        serde_json::from_reader(entry).context("manifest.json is invalid")?
    };
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let staged = StagedFile(workspace_path.join(format!("{}.importing", DB_FILE_NAME)));
    let actual_sha = {
        let mut entry = archive
            .by_name(DB_ENTRY)
            .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
        let mut out = create(&staged.0)?;
        let sha = copy_hashed(&mut entry, &mut out).context("failed to extract database entry")?;
        out.flush().context("failed to flush extracted database")?;
        sha
    };
    if let Some(expected) = manifest.db_sha256 {
        ensure!(
            expected.eq_ignore_ascii_case(&actual_sha),
            "database checksum mismatch: manifest {} but entry hashes to {}",
            expected,
            actual_sha
        );
    }

    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("failed to remove existing database {}", dst.display()))?;
    }
    std::fs::rename(&staged.0, &dst)
        .with_context(|| format!("failed to move extracted database to {}", dst.display()))?;

    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
    })
}

/// Extraction target that is deleted unless it was renamed into place.
struct StagedFile(PathBuf);

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut sig = [0u8; 4];
    let read = open(path)?
        .read(&mut sig)
        .context("failed to read file signature")?;
    Ok(read == sig.len() && sig == ZIP_MAGIC)
}
