//! Cryptographic primitives backing the Signer (C4) and Verifier (C6):
//! key/certificate bootstrap, hashing, signing, and signature
//! verification. Grounded in `original_source/scripts/digital_signer.py`,
//! translated from `cryptography`'s RSA-PSS-SHA256 to the RustCrypto `rsa`
//! crate with the same padding and digest choices.

mod keys;
mod sign;

pub use keys::{load_or_generate_identity, SigningIdentity};
pub use sign::{certificate_fingerprint, sha256_file, sha256_bytes, sign_bytes, verify_signature};
