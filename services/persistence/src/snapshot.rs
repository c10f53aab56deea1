//! Raw Snapshots — one immutable copy of the feed body per ingestion cycle
//!
//! Features:
//! - File named by the cycle's fetch time (`2025-08-24T10-29-08-123Z.kml`)
//! - Atomic publish: tmp file, fsync, hard link into place
//! - Never overwrites an existing artifact, even under a concurrent writer
//! - SHA-256 digest beside each artifact (`<artifact>.sha256`, in
//!   `sha256sum` format) for later integrity checks

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension appended to an artifact's file name for its digest.
pub const DIGEST_EXTENSION: &str = "sha256";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Raw snapshot already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("No recorded digest for {}", path.display())]
    MissingDigest { path: PathBuf },

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },
}

// ── Raw Snapshot ────────────────────────────────────────────────────

/// A raw feed body persisted for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSnapshot {
    pub path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    /// Size of the body in bytes.
    pub bytes: u64,
    /// Hex SHA-256 of the body.
    pub sha256: String,
}

/// Filesystem-safe stamp of an instant: RFC 3339 with millisecond precision,
/// `:` and `.` replaced by `-`.
pub fn file_stamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ── Raw Snapshot Store ──────────────────────────────────────────────

/// Writes and reads raw snapshots in one directory.
#[derive(Debug, Clone)]
pub struct RawSnapshotStore {
    dir: PathBuf,
    extension: String,
}

impl RawSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for a cycle fetched at `fetched_at`.
    pub fn path_for(&self, fetched_at: &DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stamp(fetched_at), self.extension))
    }

    /// Path of the digest recorded for `artifact`.
    pub fn digest_path(&self, artifact: &Path) -> PathBuf {
        let mut name = artifact.as_os_str().to_owned();
        name.push(".");
        name.push(DIGEST_EXTENSION);
        PathBuf::from(name)
    }

    /// Persist the unmodified body and its digest. Fails if the artifact
    /// already exists.
    pub fn write(
        &self,
        fetched_at: &DateTime<Utc>,
        body: &str,
    ) -> Result<RawSnapshot, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(fetched_at);
        let tmp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            file_name(&path),
            std::process::id()
        ));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }

        // A hard link never replaces an existing target
        let published = fs::hard_link(&tmp_path, &path);
        fs::remove_file(&tmp_path)?;
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SnapshotError::AlreadyExists { path });
            }
            Err(e) => return Err(e.into()),
        }

        let sha256 = sha256_hex(body.as_bytes());
        {
            let mut digest = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.digest_path(&path))?;
            writeln!(digest, "{}  {}", sha256, file_name(&path))?;
            digest.sync_all()?;
        }

        Ok(RawSnapshot {
            path,
            fetched_at: *fetched_at,
            bytes: body.len() as u64,
            sha256,
        })
    }

    /// List artifact paths, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let suffix = format!(".{}", self.extension);
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.ends_with(&suffix) && !name.starts_with('.')
            })
            .map(|e| e.path())
            .collect();
        // Stamps are fixed-width UTC, so lexical order is chronological
        paths.sort();
        Ok(paths)
    }

    /// Read an artifact back.
    pub fn load(&self, path: &Path) -> Result<String, SnapshotError> {
        Ok(fs::read_to_string(path)?)
    }

    /// Check that an artifact still matches its recorded digest, returning
    /// the digest.
    pub fn verify(&self, path: &Path) -> Result<String, SnapshotError> {
        let recorded = match fs::read_to_string(self.digest_path(path)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapshotError::MissingDigest {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let expected = recorded
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let actual = sha256_hex(&fs::read(path)?);
        if actual != expected {
            return Err(SnapshotError::IntegrityFailure { expected, actual });
        }
        Ok(actual)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
