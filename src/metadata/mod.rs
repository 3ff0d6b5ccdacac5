//! Metadata store seam. The relational-schema choice for the user and
//! permissions model is explicitly out of scope, so the engines depend on
//! this trait rather than any particular database driver. One reference
//! adapter — [`FileMetadataStore`] — ships for tests and small deployments.

mod file_store;

pub use file_store::FileMetadataStore;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Result of the most recent re-verification of a signature (C6). A row is
/// committed as `Valid` at signing time, since the signature was just
/// computed over the file's current bytes; it moves to `Invalid` if a later
/// re-verification finds the file no longer matches, mirroring the
/// `digital_signatures.verification_status` column of the original schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Valid,
    Invalid,
}

/// A committed Signature row, mirroring the sidecar on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignatureRow {
    pub path: String,
    pub file_hash: String,
    pub signature: String,
    pub signature_algorithm: String,
    pub certificate_fingerprint: String,
    pub signed_at: DateTime<Utc>,
    pub tsa_timestamp: Option<String>,
    pub file_size: u64,
    pub timestamp_pending: bool,
    pub verification_status: VerificationStatus,
}

/// A committed ArchiveEntry row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveRow {
    pub original_path: String,
    pub archive_path: String,
    pub compression: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub archive_hash: String,
    pub created_at: DateTime<Utc>,
    pub retention_until: NaiveDate,
}

/// A committed ComplianceReport row. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRow {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub score: f64,
}

/// A single append-only access-audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessLogEvent {
    pub action: String,
    pub occurred_at: DateTime<Utc>,
    pub success: bool,
}

/// Uniform CRUD the core engines depend on. Implementations own their own
/// transaction semantics per call; the core never asks for a multi-row
/// transaction.
pub trait MetadataStore: Send + Sync {
    fn upsert_signature(&self, row: SignatureRow) -> crate::error::Result<()>;
    fn select_signature(&self, path: &str) -> crate::error::Result<Option<SignatureRow>>;
    fn select_signatures_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<SignatureRow>>;
    fn delete_signature(&self, path: &str) -> crate::error::Result<()>;

    fn upsert_archive(&self, row: ArchiveRow) -> crate::error::Result<()>;
    fn select_archive(&self, archive_path: &str) -> crate::error::Result<Option<ArchiveRow>>;
    fn select_archives_expired(&self, today: NaiveDate) -> crate::error::Result<Vec<ArchiveRow>>;
    fn select_archives_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<ArchiveRow>>;
    fn delete_archive(&self, archive_path: &str) -> crate::error::Result<()>;

    fn insert_report(&self, row: ReportRow) -> crate::error::Result<()>;

    fn append_access_log(&self, event: AccessLogEvent) -> crate::error::Result<()>;
    fn select_access_log_in(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Vec<AccessLogEvent>>;
}
