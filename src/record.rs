//! The in-memory log record produced by the Ingest Listener and consumed
//! by the Writer Pool. A `LogRecord` never outlives the process; it becomes
//! exactly one line in a device's daily file.

use std::net::IpAddr;
use std::time::{Instant, SystemTime};

/// One syslog datagram, resolved to a device.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Wallclock time the datagram was received, captured before device
    /// resolution so the stored timestamp reflects arrival, not processing.
    pub received_at: SystemTime,
    /// Monotonic counterpart of `received_at`, used only for latency
    /// measurement; never persisted.
    pub received_instant: Instant,
    pub source_addr: IpAddr,
    pub device_id: String,
    /// Raw datagram bytes, preserved verbatim for byte-exact retention.
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(source_addr: IpAddr, device_id: String, payload: Vec<u8>) -> Self {
        LogRecord {
            received_at: SystemTime::now(),
            received_instant: Instant::now(),
            source_addr,
            device_id,
            payload,
        }
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// Lossy UTF-8 view of the payload for the text line, per the
    /// byte-exact-retention-but-lossy-display policy in the ingest design.
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// The date (UTC) this record belongs to, used as the second half of
    /// the writer pool's dispatch key.
    pub fn date_key(&self) -> chrono::NaiveDate {
        chrono::DateTime::<chrono::Utc>::from(self.received_at)
            .date_naive()
    }

    /// Formats the line exactly as specified: `"<timestamp> | <ip> | <payload>\n"`.
    pub fn format_line(&self) -> String {
        let ts: chrono::DateTime<chrono::Utc> = self.received_at.into();
        format!(
            "{} | {} | {}\n",
            ts.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.source_addr,
            self.payload_text()
        )
    }
}
