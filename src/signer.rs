//! Signer (C4): hashes, signs, and (optionally) timestamps sealed files.
//!
//! Triggered by `SEALED` writer-pool events and by a scheduled sweep that
//! finds sealed files lacking a `.sig` sidecar — both paths converge on
//! [`Signer::sign_file`], which is idempotent on `(path, file_hash)` so a
//! crash between sidecar and row commit is repaired by the next sweep
//! rather than treated as an error.

use crate::config::Config;
use crate::crypto::{self, SigningIdentity};
use crate::error::{PipelineError, Result};
use crate::metadata::{MetadataStore, SignatureRow, VerificationStatus};
use crate::sidecar::SidecarDocument;
use crate::tsa::{TimestampOutcome, TsaClient};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SIGN_RETRY_BACKOFFS_MS: [u64; 5] = [50, 200, 800, 3_200, 12_800];

pub struct Signer {
    config: Config,
    identity: SigningIdentity,
    store: std::sync::Arc<dyn MetadataStore>,
    tsa: Option<TsaClient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    Signed,
    AlreadySigned,
}

impl Signer {
    pub fn new(
        config: Config,
        identity: SigningIdentity,
        store: std::sync::Arc<dyn MetadataStore>,
    ) -> Self {
        let tsa = if config.tsa_enabled {
            config.tsa_url.as_ref().map(|url| {
                TsaClient::new(url.clone(), Duration::from_secs(config.tsa_timeout_seconds))
            })
        } else {
            None
        };
        Signer {
            config,
            identity,
            store,
            tsa,
        }
    }

    /// Signs a sealed file if it has not already been signed with a
    /// matching hash. Retries hashing/signing with exponential backoff up
    /// to 5 attempts, matching the spec's `SignFailure` retry policy.
    pub fn sign_file(&self, path: &Path) -> Result<SignOutcome> {
        let file_hash = self.hash_with_retry(path)?;

        if let Some(existing) = self.store.select_signature(&path.display().to_string())? {
            if existing.file_hash == file_hash && !existing.timestamp_pending {
                return Ok(SignOutcome::AlreadySigned);
            }
        }

        let file_bytes = std::fs::read(path).map_err(|e| PipelineError::io(path.display().to_string(), e))?;
        let file_size = file_bytes.len() as u64;

        let signature = crypto::sign_bytes(&self.identity.private_key, &file_bytes);

        let (tsa_token, timestamp_pending) = match &self.tsa {
            Some(client) => {
                let digest = hex_decode(&file_hash);
                match client.request_timestamp(&digest) {
                    TimestampOutcome::Token(token) => (Some(token), false),
                    TimestampOutcome::Pending => (None, true),
                }
            }
            None => (None, false),
        };

        let sidecar = SidecarDocument::new(
            path,
            file_hash.clone(),
            signature.clone(),
            self.identity.certificate_fingerprint.clone(),
            tsa_token.clone(),
            file_size,
            &self.config,
        );
        let sidecar_path = SidecarDocument::sidecar_path_for(path);
        sidecar.write_atomic(&sidecar_path)?;

        self.commit_row(path, file_hash, signature, tsa_token, file_size, timestamp_pending)?;

        Ok(SignOutcome::Signed)
    }

    /// Re-commits the metadata row for a sidecar that already exists on
    /// disk but whose row commit previously failed — the repair path the
    /// sweep takes when it finds a sidecar without a row.
    pub fn recommit_from_sidecar(&self, sidecar_path: &Path) -> Result<()> {
        let doc = SidecarDocument::read(sidecar_path)?;
        let timestamp_pending = self.tsa.is_some() && doc.tsa_timestamp.is_none();
        let row = SignatureRow {
            path: doc.file_path,
            file_hash: doc.file_hash,
            signature: doc.signature,
            signature_algorithm: doc.signature_algorithm,
            certificate_fingerprint: doc.certificate_fingerprint,
            signed_at: doc.signed_at,
            tsa_timestamp: doc.tsa_timestamp,
            file_size: doc.file_size,
            timestamp_pending,
            verification_status: VerificationStatus::Valid,
        };
        self.store.upsert_signature(row)
    }

    fn commit_row(
        &self,
        path: &Path,
        file_hash: String,
        signature: Vec<u8>,
        tsa_token: Option<Vec<u8>>,
        file_size: u64,
        timestamp_pending: bool,
    ) -> Result<()> {
        use base64::Engine;
        let row = SignatureRow {
            path: path.display().to_string(),
            file_hash,
            signature: base64::engine::general_purpose::STANDARD.encode(signature),
            signature_algorithm: self.config.signature_algorithm.clone(),
            certificate_fingerprint: self.identity.certificate_fingerprint.clone(),
            signed_at: Utc::now(),
            tsa_timestamp: tsa_token.map(|t| base64::engine::general_purpose::STANDARD.encode(t)),
            file_size,
            timestamp_pending,
            verification_status: VerificationStatus::Valid,
        };
        self.store.upsert_signature(row)
    }

    /// Re-requests a trusted timestamp for a row left `timestamp_pending`
    /// by a prior TSA timeout, per the "retry on next sweep" policy (spec
    /// TSA row semantics). Updates both the sidecar and the row when the
    /// TSA responds; leaves both untouched (to be retried again) if it is
    /// still unreachable.
    fn retry_pending_timestamp(&self, path: &Path, existing: SignatureRow) -> Result<()> {
        let Some(client) = &self.tsa else {
            return Ok(());
        };
        let digest = hex_decode(&existing.file_hash);
        let TimestampOutcome::Token(token) = client.request_timestamp(&digest) else {
            return Ok(());
        };

        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&token);

        let sidecar_path = SidecarDocument::sidecar_path_for(path);
        if sidecar_path.exists() {
            let mut doc = SidecarDocument::read(&sidecar_path)?;
            doc.tsa_timestamp = Some(encoded.clone());
            doc.write_atomic(&sidecar_path)?;
        }

        let mut row = existing;
        row.tsa_timestamp = Some(encoded);
        row.timestamp_pending = false;
        self.store.upsert_signature(row)
    }

    fn hash_with_retry(&self, path: &Path) -> Result<String> {
        let mut last_err = None;
        for delay_ms in SIGN_RETRY_BACKOFFS_MS {
            match crypto::sha256_file(path) {
                Ok(hash) => return Ok(hash),
                Err(e) => {
                    last_err = Some(e);
                    std::thread::sleep(Duration::from_millis(delay_ms));
                }
            }
        }
        Err(PipelineError::io(
            path.display().to_string(),
            last_err.unwrap_or_else(|| std::io::Error::other("hash retries exhausted")),
        ))
    }

    /// Sweep: finds sealed `.log` files under `log_base_path` that lack a
    /// `.sig` sidecar, or have a sidecar without a committed row, and signs
    /// or re-commits them.
    pub fn sweep(&self) -> Result<Vec<PathBuf>> {
        let mut touched = Vec::new();
        let today = Utc::now().date_naive();

        if !self.config.log_base_path.exists() {
            return Ok(touched);
        }

        for device_dir in std::fs::read_dir(&self.config.log_base_path)
            .map_err(|e| PipelineError::io(self.config.log_base_path.display().to_string(), e))?
        {
            let device_dir = device_dir.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
            if !device_dir.path().is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(device_dir.path())
                .map_err(|e| PipelineError::io(device_dir.path().display().to_string(), e))?
            {
                let entry = entry.map_err(|e| PipelineError::io("readdir entry".to_string(), e))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("log") {
                    continue;
                }
                let Some(date) = file_date(&path) else { continue };
                if date >= today {
                    continue; // not yet sealed
                }

                let sidecar_path = SidecarDocument::sidecar_path_for(&path);
                if sidecar_path.exists() {
                    match self.store.select_signature(&path.display().to_string())? {
                        None => {
                            self.recommit_from_sidecar(&sidecar_path)?;
                            touched.push(path);
                        }
                        Some(row) if row.timestamp_pending => {
                            self.retry_pending_timestamp(&path, row)?;
                            touched.push(path);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                self.sign_file(&path)?;
                touched.push(path);
            }
        }

        Ok(touched)
    }
}

fn file_date(path: &Path) -> Option<chrono::NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    chrono::NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

fn hex_decode(hash_hex: &str) -> Vec<u8> {
    hex::decode(hash_hex).unwrap_or_default()
}
