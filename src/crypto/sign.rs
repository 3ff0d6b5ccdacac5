//! Hashing, signing, and verification. Grounded in
//! `original_source/scripts/digital_signer.py`: `calculate_file_hash`
//! (streamed SHA-256), `sign_data`/`verify_signature` (RSA-PSS-SHA256,
//! MGF1-SHA256, max salt length), and `get_certificate_fingerprint`
//! (SHA-256 of the DER certificate, hex-encoded).

use rsa::pkcs8::DecodePublicKey;
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const HASH_CHUNK_SIZE: usize = 4096;

/// Streams a file through SHA-256 in 4 KiB chunks rather than reading it
/// whole, matching the original hashing routine.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// RSA-PSS-SHA256 with MGF1-SHA256 and the maximum salt length, matching
/// `cryptography`'s `padding.PSS(mgf=MGF1(SHA256), salt_length=MAX_LENGTH)`.
pub fn sign_bytes(private_key: &RsaPrivateKey, data: &[u8]) -> Vec<u8> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, data);
    signature.to_vec()
}

pub fn verify_signature(certificate_der: &[u8], data: &[u8], signature: &[u8]) -> anyhow::Result<bool> {
    let public_key = public_key_from_certificate_der(certificate_der)?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signature = Signature::try_from(signature)
        .map_err(|e| anyhow::anyhow!("malformed signature bytes: {e}"))?;
    Ok(verifying_key.verify(data, &signature).is_ok())
}

/// Extracts the RSA public key from an X.509 certificate's SubjectPublicKeyInfo.
fn public_key_from_certificate_der(der: &[u8]) -> anyhow::Result<RsaPublicKey> {
    use x509_cert::der::{Decode, Encode};
    use x509_cert::Certificate;

    let cert = Certificate::from_der(der)
        .map_err(|e| anyhow::anyhow!("invalid certificate: {e}"))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| anyhow::anyhow!("failed to re-encode public key info: {e}"))?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| anyhow::anyhow!("failed to parse RSA public key from certificate: {e}"))
}

/// SHA-256 of the DER certificate bytes, hex-encoded.
pub fn certificate_fingerprint(certificate_der: &[u8]) -> String {
    sha256_bytes(certificate_der)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn sha256_file_matches_sha256_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello compliance world").unwrap();
        let from_file = sha256_file(file.path()).unwrap();
        let from_bytes = sha256_bytes(b"hello compliance world");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn sign_and_verify_round_trip_needs_matching_certificate() {
        // Signing only needs the private key; full verify round-trip is
        // exercised in crypto::keys tests where a real certificate exists.
        let key = test_key();
        let sig = sign_bytes(&key, b"payload");
        assert!(!sig.is_empty());
    }

    #[test]
    fn fingerprint_is_64_hex_chars() {
        let fp = certificate_fingerprint(b"not-a-real-cert-but-deterministic");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
