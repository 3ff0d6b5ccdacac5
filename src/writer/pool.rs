//! `WriterPool`: the public entry point for C2. Owns the key→inbox map,
//! the fixed set of worker slots, and round-robin assignment once the
//! configured pool size is exhausted.

use super::inbox::Inbox;
use super::worker::{self, SlotKeys};
use super::Key;
use crate::config::Config;
use crate::record::LogRecord;
use ahash::AHashMap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle events the pool publishes as writers retire.
#[derive(Debug, Clone)]
pub enum WriterEvent {
    Sealed {
        device_id: String,
        date: chrono::NaiveDate,
        path: PathBuf,
    },
    WriteFailure {
        device_id: String,
        date: chrono::NaiveDate,
        path: PathBuf,
        reason: String,
    },
}

pub struct WriterPool {
    log_base_path: PathBuf,
    inboxes: Arc<Mutex<AHashMap<Key, Arc<Inbox>>>>,
    key_slot: Mutex<AHashMap<Key, usize>>,
    slots: Vec<Arc<SlotKeys>>,
    next_slot: AtomicUsize,
    dropped_by_device: Mutex<AHashMap<String, Arc<AtomicU64>>>,
    queue_depth: usize,
    events_tx: Sender<WriterEvent>,
    events_rx: Receiver<WriterEvent>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WriterPool {
    pub fn new(config: &Config) -> Arc<Self> {
        let (events_tx, events_rx) = unbounded();
        let slots: Vec<Arc<SlotKeys>> = (0..config.writer_pool_size.max(1))
            .map(|_| {
                Arc::new(SlotKeys {
                    keys: Mutex::new(Vec::new()),
                })
            })
            .collect();

        let pool = Arc::new(WriterPool {
            log_base_path: config.log_base_path.clone(),
            inboxes: Arc::new(Mutex::new(AHashMap::new())),
            key_slot: Mutex::new(AHashMap::new()),
            slots,
            next_slot: AtomicUsize::new(0),
            dropped_by_device: Mutex::new(AHashMap::new()),
            queue_depth: config.writer_queue_depth,
            events_tx,
            events_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        });

        let batch_size = config.writer_batch_size;
        let flush_interval = Duration::from_millis(config.writer_flush_interval_ms);
        let mut handles = Vec::new();
        for slot in &pool.slots {
            let slot = slot.clone();
            let inboxes = pool.inboxes.clone();
            let base = pool.log_base_path.clone();
            let tx = pool.events_tx.clone();
            let shutdown = pool.shutdown.clone();
            handles.push(std::thread::spawn(move || {
                worker::run_slot(slot, inboxes, base, batch_size, flush_interval, tx, shutdown);
            }));
        }
        *pool.threads.lock() = handles;
        pool
    }

    /// Non-blocking enqueue. Lazily creates a key's inbox and assigns it to
    /// a slot (a fresh thread while the pool has capacity, otherwise the
    /// next slot in round-robin order).
    pub fn enqueue(&self, record: LogRecord) {
        let key: Key = (record.device_id.clone(), record.date_key());

        let inbox = {
            let mut inboxes = self.inboxes.lock();
            if let Some(inbox) = inboxes.get(&key) {
                inbox.clone()
            } else {
                let counter = self.counter_for(&key.0);
                let inbox = Arc::new(Inbox::new(self.queue_depth, counter));
                inboxes.insert(key.clone(), inbox.clone());
                self.assign_slot(&key);
                inbox
            }
        };

        inbox.push(record);
    }

    fn counter_for(&self, device_id: &str) -> Arc<AtomicU64> {
        self.dropped_by_device
            .lock()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    fn assign_slot(&self, key: &Key) {
        let mut key_slot = self.key_slot.lock();
        if key_slot.contains_key(key) {
            return;
        }
        let slot_index = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[slot_index].keys.lock().push(key.clone());
        key_slot.insert(key.clone(), slot_index);
    }

    /// Total records dropped for a device across all its daily keys.
    pub fn dropped_total(&self, device_id: &str) -> u64 {
        self.dropped_by_device
            .lock()
            .get(device_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Lifecycle events (`SEALED`, `WriteFailure`) for the Signer and
    /// observability layer to consume.
    pub fn events(&self) -> &Receiver<WriterEvent> {
        &self.events_rx
    }

    /// Cooperative shutdown: stop accepting new work is the caller's
    /// responsibility (stop calling `enqueue`); this flips the flag each
    /// worker checks once its current pass is idle, then joins.
    pub fn shutdown(&self, grace: Duration) {
        self.shutdown.store(true, Ordering::Relaxed);
        let deadline = std::time::Instant::now() + grace;
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                // Grace period elapsed; detach rather than block shutdown
                // forever. The in-flight item resumes idempotently next
                // start since commit order is strict.
                drop(handle);
            } else {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use tempfile::TempDir;

    fn cfg(base: &std::path::Path) -> Config {
        let mut cfg = Config::default();
        cfg.log_base_path = base.to_path_buf();
        cfg.writer_pool_size = 2;
        cfg.writer_flush_interval_ms = 0;
        cfg
    }

    #[test]
    fn enqueue_writes_lines_in_fifo_order() {
        let dir = TempDir::new().unwrap();
        let pool = WriterPool::new(&cfg(dir.path()));

        for payload in ["a", "b", "c"] {
            pool.enqueue(LogRecord::new(
                IpAddr::from([10, 0, 0, 5]),
                "device-for-10-0-0-5".to_string(),
                payload.as_bytes().to_vec(),
            ));
        }

        // Give the worker thread a moment to drain the batch.
        std::thread::sleep(Duration::from_millis(100));

        let today = chrono::Utc::now().date_naive();
        let path = dir
            .path()
            .join("device-for-10-0-0-5")
            .join(format!("{today}.log"));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("| a"));
        assert!(lines[1].ends_with("| b"));
        assert!(lines[2].ends_with("| c"));

        pool.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn overflow_on_one_device_does_not_affect_another() {
        let dir = TempDir::new().unwrap();
        let mut c = cfg(dir.path());
        c.writer_queue_depth = 4;
        let pool = WriterPool::new(&c);

        for i in 0..40 {
            pool.enqueue(LogRecord::new(
                IpAddr::from([10, 0, 0, 9]),
                "hot-device".to_string(),
                i.to_string().into_bytes(),
            ));
        }
        pool.enqueue(LogRecord::new(
            IpAddr::from([10, 0, 0, 10]),
            "quiet-device".to_string(),
            b"ok".to_vec(),
        ));

        std::thread::sleep(Duration::from_millis(150));

        assert!(pool.dropped_total("hot-device") > 0);
        assert_eq!(pool.dropped_total("quiet-device"), 0);

        pool.shutdown(Duration::from_secs(2));
    }
}
