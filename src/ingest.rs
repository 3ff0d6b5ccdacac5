//! Ingest Listener (C3): receives syslog datagrams on a UDP socket,
//! resolves the source to a device id, and hands the record to the Writer
//! Pool. Never blocks on anything beyond the pool's non-blocking enqueue.

use crate::resolver::DeviceResolver;
use crate::writer::WriterPool;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Datagrams larger than this are truncated by the kernel before we see
/// them; 64 KiB covers the largest UDP payload possible over IPv4.
const RECV_BUFFER_SIZE: usize = 65_536;

pub struct IngestListener {
    socket: UdpSocket,
    resolver: Arc<DeviceResolver>,
    writer_pool: Arc<WriterPool>,
    received_total: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl IngestListener {
    pub fn bind(
        port: u16,
        resolver: Arc<DeviceResolver>,
        writer_pool: Arc<WriterPool>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        // Bounded read timeout so the accept loop can observe a shutdown
        // flag instead of blocking forever in recv_from.
        socket.set_read_timeout(Some(std::time::Duration::from_millis(200)))?;
        Ok(IngestListener {
            socket,
            resolver,
            writer_pool,
            received_total: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn received_total(&self) -> u64 {
        self.received_total.load(Ordering::Relaxed)
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the receive loop until `shutdown_handle()` is set. Intended to
    /// be the body of a dedicated OS thread.
    pub fn run(&self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    self.received_total.fetch_add(1, Ordering::Relaxed);
                    let device_id = self.resolver.resolve_addr(peer.ip());
                    let record = crate::record::LogRecord::new(peer.ip(), device_id, buf[..len].to_vec());
                    self.writer_pool.enqueue(record);
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ingest listener recv_from failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resolver::DeviceMap;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    #[test]
    fn received_datagram_is_written_to_a_device_file() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.log_base_path = dir.path().to_path_buf();
        config.writer_flush_interval_ms = 0;
        let pool = WriterPool::new(&config);
        let resolver = Arc::new(DeviceResolver::new(DeviceMap::new(
            [(IpAddr::V4(Ipv4Addr::LOCALHOST), "loopback-sender".to_string())]
                .into_iter()
                .collect(),
            vec![],
        )));

        let listener = IngestListener::bind(0, resolver, pool.clone()).unwrap();
        let bound_port = listener.socket.local_addr().unwrap().port();
        let shutdown = listener.shutdown_handle();

        let handle = std::thread::spawn(move || listener.run());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"hello", ("127.0.0.1", bound_port))
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(300));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        let today = chrono::Utc::now().date_naive();
        let path = dir.path().join("loopback-sender").join(format!("{today}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.ends_with("| hello\n"));

        pool.shutdown(std::time::Duration::from_secs(2));
    }
}
