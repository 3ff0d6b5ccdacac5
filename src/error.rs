//! Error types shared across the log-custody pipeline.
//!
//! Every engine (writer pool, signer, archiver, verifier, retention sweeper,
//! reporter) returns `Result<T, PipelineError>` so callers can match on the
//! handling policy described in the error-handling design rather than on
//! a formatted string. `anyhow::Result` is reserved for the composition
//! boundary (the binary entry point and the engine scheduler), where a
//! failure simply needs to be logged and the process moved on.

use thiserror::Error;

/// Handling-policy classification for a pipeline failure.
///
/// Mirrors the "Kind" column of the error-handling design: each variant
/// corresponds to a row with its own retry/escalation policy, so engines
/// can dispatch on `kind()` instead of re-deriving the policy from the
/// error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Disk full, EINTR, a transient network blip. Retry with backoff.
    Transient,
    /// Read-only filesystem, missing directory. Engine must not start.
    Permanent,
    /// Archive hash mismatch, tamper detection. Abort, never delete source.
    Integrity,
    /// Missing key, signing failure. Retry once, then stop the engine.
    Crypto,
    /// TSA timeout or malformed response. Proceed without a token.
    Tsa,
    /// The metadata store adapter could not be reached.
    StoreUnavailable,
    /// A bounded queue was full; the caller already dropped the item.
    Overflow,
}

/// Error type returned by pipeline engines.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} could not be opened: filesystem appears permanently unavailable ({reason})")]
    PermanentIo { path: String, reason: String },

    #[error("integrity check failed for {path}: {reason}")]
    Integrity { path: String, reason: String },

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("timestamp authority error: {0}")]
    Tsa(String),

    #[error("metadata store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("queue overflow for key {0}")]
    Overflow(String),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Classifies this error per the error-handling design table.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Io { .. } => ErrorKind::Transient,
            PipelineError::PermanentIo { .. } => ErrorKind::Permanent,
            PipelineError::Integrity { .. } => ErrorKind::Integrity,
            PipelineError::Crypto(_) => ErrorKind::Crypto,
            PipelineError::Tsa(_) => ErrorKind::Tsa,
            PipelineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PipelineError::Overflow(_) => ErrorKind::Overflow,
            PipelineError::Other(_) => ErrorKind::Transient,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the engine modules.
pub type Result<T> = std::result::Result<T, PipelineError>;
