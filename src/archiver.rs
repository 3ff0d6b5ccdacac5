//! Archiver (C5): compresses signed files, verifies the archive against the
//! original, records provenance, and deletes the original only after the
//! metadata row is durable — the two-phase commit the design notes require.

use crate::config::Config;
use crate::crypto;
use crate::error::{PipelineError, Result};
use crate::metadata::{ArchiveRow, MetadataStore};
use crate::sidecar::SidecarDocument;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Archiver {
    config: Config,
    store: Arc<dyn MetadataStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived,
    SkippedNotSigned,
    VerifyFailed,
}

impl Archiver {
    pub fn new(config: Config, store: Arc<dyn MetadataStore>) -> Self {
        Archiver { config, store }
    }

    /// Archives every DeviceFile older than `archive_after_days` across all
    /// device directories. Returns the outcome per path so callers can
    /// report skips and failures without the sweep bailing on the first one.
    pub fn sweep(&self) -> Result<Vec<(PathBuf, ArchiveOutcome)>> {
        let mut results = Vec::new();
        if !self.config.log_base_path.exists() {
            return Ok(results);
        }

        let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.config.archive_after_days);

        for device_dir in fs::read_dir(&self.config.log_base_path)
            .map_err(|e| PipelineError::io(self.config.log_base_path.display().to_string(), e))?
        {
            let device_dir = device_dir.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
            if !device_dir.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(device_dir.path())
                .map_err(|e| PipelineError::io(device_dir.path().display().to_string(), e))?
            {
                let entry = entry.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("log") {
                    continue;
                }
                let Some(date) = file_date(&path) else { continue };
                if date >= cutoff {
                    continue;
                }
                let outcome = self.archive_file(&path)?;
                results.push((path, outcome));
            }
        }

        self.cleanup_orphan_archives()?;
        Ok(results)
    }

    /// Archives a single DeviceFile. Public so the administrative CLI's
    /// `archive` subcommand can target one file on demand.
    pub fn archive_file(&self, path: &Path) -> Result<ArchiveOutcome> {
        let Some(signature) = self.store.select_signature(&path.display().to_string())? else {
            return Ok(ArchiveOutcome::SkippedNotSigned);
        };

        let device_id = device_id_of(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::Other(format!("non-UTF8 file name: {}", path.display())))?;

        let archive_dir = self.config.archive_base_path.join(&device_id);
        fs::create_dir_all(&archive_dir).map_err(|e| PipelineError::io(archive_dir.display().to_string(), e))?;
        let archive_path = archive_dir.join(format!("{file_name}.gz"));
        let tmp_path = archive_dir.join(format!("{file_name}.gz.tmp"));

        let original_size = fs::metadata(path)
            .map_err(|e| PipelineError::io(path.display().to_string(), e))?
            .len();

        compress_to(path, &tmp_path)?;

        let verify_hash = sha256_of_gzip(&tmp_path)?;
        if verify_hash != signature.file_hash {
            let _ = fs::remove_file(&tmp_path);
            return Ok(ArchiveOutcome::VerifyFailed);
        }

        fs::rename(&tmp_path, &archive_path)
            .map_err(|e| PipelineError::io(archive_path.display().to_string(), e))?;

        let compressed_size = fs::metadata(&archive_path)
            .map_err(|e| PipelineError::io(archive_path.display().to_string(), e))?
            .len();

        let row = ArchiveRow {
            original_path: path.display().to_string(),
            archive_path: archive_path.display().to_string(),
            compression: "gzip".to_string(),
            original_size,
            compressed_size,
            archive_hash: verify_hash,
            created_at: Utc::now(),
            retention_until: Utc::now().date_naive() + chrono::Duration::days(self.config.retention_days),
        };
        self.store.upsert_archive(row)?;

        // Best-effort; an anomaly here (row committed, original still
        // present) is repaired by the next sweep.
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(SidecarDocument::sidecar_path_for(path));
        let _ = self.store.delete_signature(&path.display().to_string());

        Ok(ArchiveOutcome::Archived)
    }

    /// Deletes `.log.gz` artifacts with no matching ArchiveEntry row — the
    /// debris a crash between compression and row commit leaves behind.
    fn cleanup_orphan_archives(&self) -> Result<()> {
        if !self.config.archive_base_path.exists() {
            return Ok(());
        }
        for device_dir in fs::read_dir(&self.config.archive_base_path)
            .map_err(|e| PipelineError::io(self.config.archive_base_path.display().to_string(), e))?
        {
            let device_dir = device_dir.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
            if !device_dir.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(device_dir.path())
                .map_err(|e| PipelineError::io(device_dir.path().display().to_string(), e))?
            {
                let entry = entry.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("gz") {
                    continue;
                }
                if self.store.select_archive(&path.display().to_string())?.is_none() {
                    tracing::warn!(path = %path.display(), "removing orphan archive with no metadata row");
                    let _ = fs::remove_file(&path);
                }
            }
        }
        Ok(())
    }
}

fn compress_to(source: &Path, dest: &Path) -> Result<()> {
    let mut input = File::open(source).map_err(|e| PipelineError::io(source.display().to_string(), e))?;
    let output = File::create(dest).map_err(|e| PipelineError::io(dest.display().to_string(), e))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|e| PipelineError::io(source.display().to_string(), e))?;
    encoder
        .finish()
        .map_err(|e| PipelineError::io(dest.display().to_string(), e))?;
    Ok(())
}

/// Decompresses and hashes in one pass, matching the spec's normalization
/// on decompressed-content hashing.
fn sha256_of_gzip(archive_path: &Path) -> Result<String> {
    let file = File::open(archive_path).map_err(|e| PipelineError::io(archive_path.display().to_string(), e))?;
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut buf = [0u8; 4096];
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    loop {
        let n = decoder
            .read(&mut buf)
            .map_err(|e| PipelineError::io(archive_path.display().to_string(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn device_id_of(path: &Path) -> Result<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::Other(format!("cannot determine device id for {}", path.display())))
}

fn file_date(path: &Path) -> Option<chrono::NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    chrono::NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FileMetadataStore, SignatureRow};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Archiver, Config) {
        let mut config = Config::default();
        config.log_base_path = dir.path().join("logs");
        config.archive_base_path = dir.path().join("archive");
        config.archive_after_days = 7;
        config.retention_days = 730;
        let store = Arc::new(FileMetadataStore::open(dir.path().join("state")).unwrap());
        (Archiver::new(config.clone(), store), config)
    }

    fn sign_row(path: &Path, file_hash: String) -> SignatureRow {
        SignatureRow {
            path: path.display().to_string(),
            file_hash,
            signature: "sig".to_string(),
            signature_algorithm: "RSA-PSS-SHA256".to_string(),
            certificate_fingerprint: "fp".to_string(),
            signed_at: Utc::now(),
            tsa_timestamp: None,
            file_size: 0,
            timestamp_pending: false,
            verification_status: crate::metadata::VerificationStatus::Valid,
        }
    }

    #[test]
    fn archives_signed_file_and_removes_original() {
        let dir = TempDir::new().unwrap();
        let (archiver, config) = setup(&dir);
        let device_dir = config.log_base_path.join("device-a");
        fs::create_dir_all(&device_dir).unwrap();
        let log_path = device_dir.join("2000-01-01.log");
        fs::write(&log_path, b"line one\nline two\n").unwrap();
        let hash = crypto::sha256_file(&log_path).unwrap();
        archiver.store.upsert_signature(sign_row(&log_path, hash)).unwrap();

        let outcome = archiver.archive_file(&log_path).unwrap();
        assert_eq!(outcome, ArchiveOutcome::Archived);
        assert!(!log_path.exists());

        let archive_path = config.archive_base_path.join("device-a").join("2000-01-01.log.gz");
        assert!(archive_path.exists());
        assert!(archiver
            .store
            .select_archive(&archive_path.display().to_string())
            .unwrap()
            .is_some());
    }

    #[test]
    fn unsigned_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (archiver, config) = setup(&dir);
        let device_dir = config.log_base_path.join("device-a");
        fs::create_dir_all(&device_dir).unwrap();
        let log_path = device_dir.join("2000-01-01.log");
        fs::write(&log_path, b"content\n").unwrap();

        let outcome = archiver.archive_file(&log_path).unwrap();
        assert_eq!(outcome, ArchiveOutcome::SkippedNotSigned);
        assert!(log_path.exists());
    }

    #[test]
    fn hash_mismatch_is_refused_and_original_kept() {
        let dir = TempDir::new().unwrap();
        let (archiver, config) = setup(&dir);
        let device_dir = config.log_base_path.join("device-a");
        fs::create_dir_all(&device_dir).unwrap();
        let log_path = device_dir.join("2000-01-01.log");
        fs::write(&log_path, b"content\n").unwrap();
        archiver
            .store
            .upsert_signature(sign_row(&log_path, "not-the-real-hash".to_string()))
            .unwrap();

        let outcome = archiver.archive_file(&log_path).unwrap();
        assert_eq!(outcome, ArchiveOutcome::VerifyFailed);
        assert!(log_path.exists());
    }
}
