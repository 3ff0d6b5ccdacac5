//! Retention Sweeper (C7): deletes archives past their retention horizon.
//! File first, row second — a row without a file is invisible to nobody
//! (it's a no-op retry), but a file without a row is invisible to the
//! auditor, which is the one thing this ordering must prevent.

use crate::error::{PipelineError, Result};
use crate::metadata::MetadataStore;
use chrono::NaiveDate;
use std::sync::Arc;

pub struct RetentionSweeper {
    store: Arc<dyn MetadataStore>,
}

pub struct SweepResult {
    pub deleted: usize,
    pub row_only_cleanups: usize,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        RetentionSweeper { store }
    }

    pub fn sweep(&self, today: NaiveDate) -> Result<SweepResult> {
        let expired = self.store.select_archives_expired(today)?;
        let mut deleted = 0;
        let mut row_only_cleanups = 0;

        for row in expired {
            let archive_path = std::path::Path::new(&row.archive_path);
            match std::fs::remove_file(archive_path) {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // File already gone; the row is the only remaining
                    // debris. Deleting it is a no-op on the next sweep.
                    row_only_cleanups += 1;
                }
                Err(e) => {
                    return Err(PipelineError::io(row.archive_path.clone(), e));
                }
            }
            self.store.delete_archive(&row.archive_path)?;
        }

        Ok(SweepResult {
            deleted,
            row_only_cleanups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ArchiveRow, FileMetadataStore};
    use chrono::Utc;
    use tempfile::TempDir;

    fn row(path: &std::path::Path, retention_until: NaiveDate) -> ArchiveRow {
        ArchiveRow {
            original_path: "orig.log".to_string(),
            archive_path: path.display().to_string(),
            compression: "gzip".to_string(),
            original_size: 10,
            compressed_size: 5,
            archive_hash: "hash".to_string(),
            created_at: Utc::now(),
            retention_until,
        }
    }

    #[test]
    fn deletes_expired_archive_and_its_row() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileMetadataStore::open(dir.path().join("state")).unwrap());
        let archive_path = dir.path().join("2020-01-01.log.gz");
        std::fs::write(&archive_path, b"compressed").unwrap();
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        store.upsert_archive(row(&archive_path, yesterday)).unwrap();

        let sweeper = RetentionSweeper::new(store.clone());
        let result = sweeper.sweep(Utc::now().date_naive()).unwrap();

        assert_eq!(result.deleted, 1);
        assert!(!archive_path.exists());
        assert!(store
            .select_archive(&archive_path.display().to_string())
            .unwrap()
            .is_none());
    }

    #[test]
    fn does_not_delete_before_retention_horizon() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileMetadataStore::open(dir.path().join("state")).unwrap());
        let archive_path = dir.path().join("2099-01-01.log.gz");
        std::fs::write(&archive_path, b"compressed").unwrap();
        let far_future = Utc::now().date_naive() + chrono::Duration::days(3650);
        store.upsert_archive(row(&archive_path, far_future)).unwrap();

        let sweeper = RetentionSweeper::new(store);
        let result = sweeper.sweep(Utc::now().date_naive()).unwrap();

        assert_eq!(result.deleted, 0);
        assert!(archive_path.exists());
    }

    #[test]
    fn row_only_cleanup_when_file_already_missing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileMetadataStore::open(dir.path().join("state")).unwrap());
        let archive_path = dir.path().join("gone.log.gz");
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        store.upsert_archive(row(&archive_path, yesterday)).unwrap();

        let sweeper = RetentionSweeper::new(store.clone());
        let result = sweeper.sweep(Utc::now().date_naive()).unwrap();

        assert_eq!(result.row_only_cleanups, 1);
        assert!(store
            .select_archive(&archive_path.display().to_string())
            .unwrap()
            .is_none());
    }
}
