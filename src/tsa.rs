//! Timestamp Authority client. Grounded in
//! `original_source/scripts/digital_signer.py::get_timestamp_from_tsa`: the
//! source posts a JSON envelope rather than a real RFC 3161 DER request, so
//! this client keeps the returned token opaque (`Vec<u8>`) and treats the
//! envelope as an implementation detail a production deployment can swap
//! for a genuine RFC 3161 client without touching the Signer.

use crate::error::PipelineError;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TimestampRequest {
    hash: String,
    algorithm: &'static str,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct TimestampResponse {
    timestamp: Option<String>,
}

pub struct TsaClient {
    url: String,
    timeout: Duration,
    agent: ureq::Agent,
}

/// Outcome of a timestamp request. `Pending` covers every recoverable
/// failure (timeout, non-200, malformed body) per the spec's
/// `TIMESTAMP_PENDING` handling — the Signer proceeds without a token and
/// lets the next sweep retry.
pub enum TimestampOutcome {
    Token(Vec<u8>),
    Pending,
}

impl TsaClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .build();
        TsaClient {
            url: url.into(),
            timeout,
            agent,
        }
    }

    /// Submits the SHA-256 digest (raw bytes, not hex) as the
    /// `messageImprint` and returns an opaque token on success.
    pub fn request_timestamp(&self, digest: &[u8]) -> TimestampOutcome {
        let body = TimestampRequest {
            hash: base64::engine::general_purpose::STANDARD.encode(digest),
            algorithm: "SHA256",
            timestamp: Utc::now().to_rfc3339(),
        };

        let result = self
            .agent
            .post(&self.url)
            .timeout(self.timeout)
            .send_json(&body);

        match result {
            Ok(response) => match response.into_json::<TimestampResponse>() {
                Ok(parsed) => match parsed.timestamp {
                    Some(encoded) => match base64::engine::general_purpose::STANDARD.decode(&encoded) {
                        Ok(token) => TimestampOutcome::Token(token),
                        Err(e) => {
                            tracing::warn!(error = %e, "TSA returned unparseable timestamp token");
                            TimestampOutcome::Pending
                        }
                    },
                    None => TimestampOutcome::Pending,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "TSA response body was not valid JSON");
                    TimestampOutcome::Pending
                }
            },
            Err(ureq::Error::Status(code, _)) => {
                tracing::warn!(status = code, "TSA returned a non-success status");
                TimestampOutcome::Pending
            }
            Err(e) => {
                tracing::warn!(error = %e, "TSA request failed or timed out");
                TimestampOutcome::Pending
            }
        }
    }
}

/// Wraps a TSA failure that an engine wants to surface rather than treat as
/// merely pending (used by the administrative CLI's `sign --strict` path).
pub fn tsa_error(reason: impl Into<String>) -> PipelineError {
    PipelineError::Tsa(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_url_yields_pending_not_panic() {
        let client = TsaClient::new("http://127.0.0.1:1", Duration::from_millis(200));
        match client.request_timestamp(b"digest-bytes") {
            TimestampOutcome::Pending => {}
            TimestampOutcome::Token(_) => panic!("expected pending outcome for unreachable TSA"),
        }
    }
}
