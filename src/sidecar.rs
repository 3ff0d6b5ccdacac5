//! The `.sig` sidecar: a UTF-8 JSON file adjacent to a signed `DeviceFile`,
//! written atomically (temp file + rename) so a crash never leaves a
//! half-written sidecar next to a fully sealed log.

use crate::config::Config;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceProfile {
    pub standard: String,
    pub version: String,
    pub retention_years: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidecarDocument {
    pub file_path: String,
    pub file_hash: String,
    pub signature: String,
    pub signature_algorithm: String,
    pub certificate_fingerprint: String,
    pub signed_at: DateTime<Utc>,
    pub tsa_timestamp: Option<String>,
    pub file_size: u64,
    pub compliance: ComplianceProfile,
}

impl SidecarDocument {
    pub fn sidecar_path_for(log_path: &Path) -> std::path::PathBuf {
        let mut s = log_path.as_os_str().to_os_string();
        s.push(".sig");
        std::path::PathBuf::from(s)
    }

    pub fn new(
        file_path: &Path,
        file_hash: String,
        signature: Vec<u8>,
        certificate_fingerprint: String,
        tsa_timestamp: Option<Vec<u8>>,
        file_size: u64,
        config: &Config,
    ) -> Self {
        use base64::Engine;
        SidecarDocument {
            file_path: file_path.display().to_string(),
            file_hash,
            signature: base64::engine::general_purpose::STANDARD.encode(signature),
            signature_algorithm: config.signature_algorithm.clone(),
            certificate_fingerprint,
            signed_at: Utc::now(),
            tsa_timestamp: tsa_timestamp
                .map(|t| base64::engine::general_purpose::STANDARD.encode(t)),
            file_size,
            compliance: ComplianceProfile {
                standard: config.compliance_standard.clone(),
                version: config.compliance_version.clone(),
                retention_years: config.compliance_retention_years,
            },
        }
    }

    pub fn write_atomic(&self, sidecar_path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Other(format!("failed to encode sidecar: {e}")))?;
        let tmp = sidecar_path.with_extension("sig.tmp");
        fs::write(&tmp, body).map_err(|e| PipelineError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, sidecar_path)
            .map_err(|e| PipelineError::io(sidecar_path.display().to_string(), e))?;
        Ok(())
    }

    pub fn read(sidecar_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(sidecar_path)
            .map_err(|e| PipelineError::io(sidecar_path.display().to_string(), e))?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::Integrity {
                path: sidecar_path.display().to_string(),
                reason: format!("malformed sidecar JSON: {e}"),
            }
        })
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&self.signature)
            .map_err(|e| PipelineError::Integrity {
                path: self.file_path.clone(),
                reason: format!("malformed signature base64: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(config: &Config) -> SidecarDocument {
        SidecarDocument::new(
            Path::new("/data/device-a/2024-03-14.log"),
            "abc123".to_string(),
            vec![1, 2, 3, 4],
            "fingerprint".to_string(),
            None,
            1024,
            config,
        )
    }

    #[test]
    fn sidecar_path_appends_sig_suffix() {
        let path = Path::new("/data/device-a/2024-03-14.log");
        let sidecar = SidecarDocument::sidecar_path_for(path);
        assert_eq!(sidecar, Path::new("/data/device-a/2024-03-14.log.sig"));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let doc = sample(&config);
        let sidecar_path = dir.path().join("2024-03-14.log.sig");
        doc.write_atomic(&sidecar_path).unwrap();

        let reloaded = SidecarDocument::read(&sidecar_path).unwrap();
        assert_eq!(reloaded, doc);
        assert_eq!(reloaded.signature_bytes().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn no_tmp_file_left_behind_after_write() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let doc = sample(&config);
        let sidecar_path = dir.path().join("2024-03-14.log.sig");
        doc.write_atomic(&sidecar_path).unwrap();
        assert!(!sidecar_path.with_extension("sig.tmp").exists());
    }
}
