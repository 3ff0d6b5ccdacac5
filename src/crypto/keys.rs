//! Key and certificate bootstrap. Loads a PKCS#8 private key and X.509
//! certificate from disk; if either is absent, generates a self-signed
//! RSA identity, matching `digital_signer.py::generate_certificates`.

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;
use time::{Duration, OffsetDateTime};

use super::sign::certificate_fingerprint;

/// Everything the Signer needs to sign a file and stamp its sidecar.
pub struct SigningIdentity {
    pub private_key: RsaPrivateKey,
    pub certificate_der: Vec<u8>,
    pub certificate_fingerprint: String,
}

/// Loads the configured key/certificate pair, generating and persisting a
/// fresh self-signed identity if either file is missing.
pub fn load_or_generate_identity(
    cert_path: &Path,
    private_key_path: &Path,
    key_size_bits: usize,
) -> anyhow::Result<SigningIdentity> {
    if cert_path.exists() && private_key_path.exists() {
        return load_identity(cert_path, private_key_path);
    }

    tracing::info!(
        cert = %cert_path.display(),
        key = %private_key_path.display(),
        "signing identity not found, generating self-signed certificate"
    );
    generate_identity(cert_path, private_key_path, key_size_bits)
}

fn load_identity(cert_path: &Path, private_key_path: &Path) -> anyhow::Result<SigningIdentity> {
    let key_pem = fs::read_to_string(private_key_path)?;
    let private_key = RsaPrivateKey::from_pkcs8_pem(&key_pem)
        .map_err(|e| anyhow::anyhow!("failed to parse private key: {e}"))?;

    let cert_pem = fs::read_to_string(cert_path)?;
    let cert_der = pem_to_der(&cert_pem)?;
    let fingerprint = certificate_fingerprint(&cert_der);

    Ok(SigningIdentity {
        private_key,
        certificate_der: cert_der,
        certificate_fingerprint: fingerprint,
    })
}

fn generate_identity(
    cert_path: &Path,
    private_key_path: &Path,
    key_size_bits: usize,
) -> anyhow::Result<SigningIdentity> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
        .map_err(|e| anyhow::anyhow!("RSA key generation failed: {e}"))?;

    let pkcs8_der = private_key
        .to_pkcs8_der()
        .map_err(|e| anyhow::anyhow!("failed to encode private key: {e}"))?;

    let pkcs8_der_doc = rustls_pki_types::PrivatePkcs8KeyDer::from(pkcs8_der.as_bytes());
    let rcgen_key =
        rcgen::KeyPair::from_pkcs8_der_and_sign_algo(&pkcs8_der_doc, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| anyhow::anyhow!("failed to wrap RSA key for certificate signing: {e}"))?;

    let mut params = rcgen::CertificateParams::new(vec![
        "logcustody.local".to_string(),
        "localhost".to_string(),
    ])
    .map_err(|e| anyhow::anyhow!("failed to build certificate params: {e}"))?;

    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CountryName, "US");
    dn.push(rcgen::DnType::OrganizationName, "Log Custody Pipeline");
    dn.push(rcgen::DnType::OrganizationalUnitName, "Compliance");
    dn.push(rcgen::DnType::CommonName, "Log Custody Signing Certificate");
    params.distinguished_name = dn;
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = OffsetDateTime::now_utc() + Duration::days(5 * 365);
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::ContentCommitment,
    ];

    let certificate = params
        .self_signed(&rcgen_key)
        .map_err(|e| anyhow::anyhow!("failed to self-sign certificate: {e}"))?;
    let certificate_der = certificate.der().to_vec();
    let fingerprint = certificate_fingerprint(&certificate_der);

    let pkcs8_pem = pkcs8_der
        .to_pem("PRIVATE KEY", rsa::pkcs8::LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("failed to PEM-encode private key: {e}"))?;
    persist_pem(private_key_path, pkcs8_pem.as_bytes())?;
    persist_pem(cert_path, certificate.pem().as_bytes())?;

    Ok(SigningIdentity {
        private_key,
        certificate_der,
        certificate_fingerprint: fingerprint,
    })
}

/// Writes a PEM file and, on Unix, restricts it to owner read/write —
/// the "restrictive file permissions" the spec requires for key material.
fn persist_pem(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

fn pem_to_der(pem_text: &str) -> anyhow::Result<Vec<u8>> {
    let body: String = pem_text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, body)
        .map_err(|e| anyhow::anyhow!("malformed certificate PEM: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_and_reloads_identity() {
        let dir = TempDir::new().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("private_key.pem");

        let first = load_or_generate_identity(&cert_path, &key_path, 2048).unwrap();
        assert!(cert_path.exists());
        assert!(key_path.exists());
        assert_eq!(first.certificate_fingerprint.len(), 64); // hex SHA-256

        let second = load_or_generate_identity(&cert_path, &key_path, 2048).unwrap();
        assert_eq!(first.certificate_fingerprint, second.certificate_fingerprint);
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("private_key.pem");
        load_or_generate_identity(&cert_path, &key_path, 2048).unwrap();

        let mode = fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
