//! Reference `MetadataStore` adapter: each table is a JSON document under a
//! state directory, guarded by an in-memory `RwLock` mirror for fast reads.
//! Not meant to scale past a single node — a real deployment fills the
//! `MetadataStore` trait with a proper relational adapter instead.

use super::{AccessLogEvent, ArchiveRow, MetadataStore, ReportRow, SignatureRow};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};

struct Tables {
    signatures: Vec<SignatureRow>,
    archives: Vec<ArchiveRow>,
    reports: Vec<ReportRow>,
    access_log: Vec<AccessLogEvent>,
}

pub struct FileMetadataStore {
    state_dir: PathBuf,
    tables: RwLock<Tables>,
}

impl FileMetadataStore {
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let state_dir = state_dir.as_ref().to_path_buf();
        fs::create_dir_all(&state_dir).map_err(|e| PipelineError::io(state_dir.display().to_string(), e))?;

        let tables = Tables {
            signatures: read_table(&state_dir.join("signatures.json"))?,
            archives: read_table(&state_dir.join("archives.json"))?,
            reports: read_table(&state_dir.join("reports.json"))?,
            access_log: read_table(&state_dir.join("access_log.json"))?,
        };

        Ok(FileMetadataStore {
            state_dir,
            tables: RwLock::new(tables),
        })
    }

    fn persist_signatures(&self, rows: &[SignatureRow]) -> Result<()> {
        write_table(&self.state_dir.join("signatures.json"), rows)
    }

    fn persist_archives(&self, rows: &[ArchiveRow]) -> Result<()> {
        write_table(&self.state_dir.join("archives.json"), rows)
    }

    fn persist_reports(&self, rows: &[ReportRow]) -> Result<()> {
        write_table(&self.state_dir.join("reports.json"), rows)
    }

    fn persist_access_log(&self, rows: &[AccessLogEvent]) -> Result<()> {
        write_table(&self.state_dir.join("access_log.json"), rows)
    }
}

fn read_table<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| PipelineError::Other(format!("corrupt metadata table {}: {e}", path.display())))
}

/// Write-temp-then-rename, the same atomicity the sidecar and archive
/// writers use, so a crash mid-write never leaves a half-written table.
fn write_table<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(rows)
        .map_err(|e| PipelineError::Other(format!("failed to encode metadata table: {e}")))?;
    fs::write(&tmp, body).map_err(|e| PipelineError::io(tmp.display().to_string(), e))?;
    fs::rename(&tmp, path).map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    Ok(())
}

impl MetadataStore for FileMetadataStore {
    fn upsert_signature(&self, row: SignatureRow) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.signatures.iter_mut().find(|r| r.path == row.path) {
            Some(existing) => *existing = row,
            None => tables.signatures.push(row),
        }
        self.persist_signatures(&tables.signatures)
    }

    fn select_signature(&self, path: &str) -> Result<Option<SignatureRow>> {
        Ok(self
            .tables
            .read()
            .signatures
            .iter()
            .find(|r| r.path == path)
            .cloned())
    }

    fn select_signatures_in(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SignatureRow>> {
        Ok(self
            .tables
            .read()
            .signatures
            .iter()
            .filter(|r| {
                let day = r.signed_at.date_naive();
                day >= start && day <= end
            })
            .cloned()
            .collect())
    }

    fn delete_signature(&self, path: &str) -> Result<()> {
        let mut tables = self.tables.write();
        tables.signatures.retain(|r| r.path != path);
        self.persist_signatures(&tables.signatures)
    }

    fn upsert_archive(&self, row: ArchiveRow) -> Result<()> {
        let mut tables = self.tables.write();
        match tables
            .archives
            .iter_mut()
            .find(|r| r.archive_path == row.archive_path)
        {
            Some(existing) => *existing = row,
            None => tables.archives.push(row),
        }
        self.persist_archives(&tables.archives)
    }

    fn select_archive(&self, archive_path: &str) -> Result<Option<ArchiveRow>> {
        Ok(self
            .tables
            .read()
            .archives
            .iter()
            .find(|r| r.archive_path == archive_path)
            .cloned())
    }

    fn select_archives_expired(&self, today: NaiveDate) -> Result<Vec<ArchiveRow>> {
        Ok(self
            .tables
            .read()
            .archives
            .iter()
            .filter(|r| r.retention_until < today)
            .cloned()
            .collect())
    }

    fn select_archives_in(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ArchiveRow>> {
        Ok(self
            .tables
            .read()
            .archives
            .iter()
            .filter(|r| {
                let day = r.created_at.date_naive();
                day >= start && day <= end
            })
            .cloned()
            .collect())
    }

    fn delete_archive(&self, archive_path: &str) -> Result<()> {
        let mut tables = self.tables.write();
        tables.archives.retain(|r| r.archive_path != archive_path);
        self.persist_archives(&tables.archives)
    }

    fn insert_report(&self, row: ReportRow) -> Result<()> {
        let mut tables = self.tables.write();
        tables.reports.push(row);
        self.persist_reports(&tables.reports)
    }

    fn append_access_log(&self, event: AccessLogEvent) -> Result<()> {
        let mut tables = self.tables.write();
        tables.access_log.push(event);
        self.persist_access_log(&tables.access_log)
    }

    fn select_access_log_in(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AccessLogEvent>> {
        Ok(self
            .tables
            .read()
            .access_log
            .iter()
            .filter(|e| {
                let day = e.occurred_at.date_naive();
                day >= start && day <= end
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sig_row(path: &str) -> SignatureRow {
        SignatureRow {
            path: path.to_string(),
            file_hash: "deadbeef".to_string(),
            signature: "sig".to_string(),
            signature_algorithm: "RSA-PSS-SHA256".to_string(),
            certificate_fingerprint: "fp".to_string(),
            signed_at: Utc::now(),
            tsa_timestamp: None,
            file_size: 42,
            timestamp_pending: false,
            verification_status: crate::metadata::VerificationStatus::Valid,
        }
    }

    #[test]
    fn upsert_then_select_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(dir.path()).unwrap();
        store.upsert_signature(sig_row("a.log")).unwrap();
        assert!(store.select_signature("a.log").unwrap().is_some());
        assert!(store.select_signature("missing.log").unwrap().is_none());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileMetadataStore::open(dir.path()).unwrap();
            store.upsert_signature(sig_row("a.log")).unwrap();
        }
        let reopened = FileMetadataStore::open(dir.path()).unwrap();
        assert!(reopened.select_signature("a.log").unwrap().is_some());
    }

    #[test]
    fn delete_removes_row() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(dir.path()).unwrap();
        store.upsert_signature(sig_row("a.log")).unwrap();
        store.delete_signature("a.log").unwrap();
        assert!(store.select_signature("a.log").unwrap().is_none());
    }
}
