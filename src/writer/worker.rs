//! Per-slot worker loop: the one thread allowed to append to any file
//! owned by the keys currently assigned to it.

use super::inbox::Inbox;
use super::pool::WriterEvent;
use super::Key;
use ahash::AHashMap;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Keys currently assigned to a slot. A slot holds exactly one key while
/// the pool has spare capacity; once saturated, further keys are appended
/// here and served round-robin by the same thread.
pub struct SlotKeys {
    pub keys: Mutex<Vec<Key>>,
}

const REOPEN_BACKOFFS_MS: [u64; 5] = [100, 500, 2_000, 10_000, 0];

struct ActiveWriter {
    path: PathBuf,
    file: Option<File>,
    degraded: bool,
    last_flush: Instant,
    unflushed: bool,
}

impl ActiveWriter {
    fn open(path: &PathBuf) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ActiveWriter {
            path: path.clone(),
            file: Some(file),
            degraded: false,
            last_flush: Instant::now(),
            unflushed: false,
        })
    }

    /// Re-opens the file handle with the backoff schedule from the spec,
    /// marking the writer `DEGRADED` when every attempt is exhausted.
    fn reopen_with_backoff(&mut self) {
        for delay_ms in REOPEN_BACKOFFS_MS {
            if delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(delay_ms));
            }
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(f) => {
                    self.file = Some(f);
                    self.degraded = false;
                    return;
                }
                Err(_) => continue,
            }
        }
        self.degraded = true;
        self.file = None;
    }

    fn append_line(&mut self, line: &str) -> bool {
        if self.file.is_none() && !self.degraded {
            self.reopen_with_backoff();
        }
        match self.file.as_mut() {
            Some(f) => match f.write_all(line.as_bytes()) {
                Ok(()) => {
                    self.unflushed = true;
                    true
                }
                Err(_) => {
                    self.file = None;
                    self.reopen_with_backoff();
                    false
                }
            },
            None => false,
        }
    }

    fn maybe_flush(&mut self, flush_interval: Duration) {
        if self.unflushed && self.last_flush.elapsed() >= flush_interval {
            if let Some(f) = self.file.as_mut() {
                let _ = f.flush();
                let _ = f.sync_data();
            }
            self.unflushed = false;
            self.last_flush = Instant::now();
        }
    }

    fn force_flush(&mut self) {
        if let Some(f) = self.file.as_mut() {
            let _ = f.flush();
            let _ = f.sync_data();
        }
        self.unflushed = false;
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_slot(
    slot: Arc<SlotKeys>,
    inboxes: Arc<Mutex<AHashMap<Key, Arc<Inbox>>>>,
    log_base_path: PathBuf,
    batch_size: usize,
    flush_interval: Duration,
    events: Sender<WriterEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut writers: AHashMap<Key, ActiveWriter> = AHashMap::new();

    loop {
        let keys = slot.keys.lock().clone();
        let mut did_work = false;

        for key in &keys {
            let inbox = {
                let guard = inboxes.lock();
                guard.get(key).cloned()
            };
            let Some(inbox) = inbox else { continue };

            let batch = inbox.drain_batch(batch_size);
            if !batch.is_empty() {
                did_work = true;
                let path = device_file_path(&log_base_path, &key.0, key.1);
                let writer = match writers.entry(key.clone()) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        match ActiveWriter::open(&path) {
                            Ok(w) => e.insert(w),
                            Err(reason) => {
                                let _ = events.send(WriterEvent::WriteFailure {
                                    device_id: key.0.clone(),
                                    date: key.1,
                                    path: path.clone(),
                                    reason: reason.to_string(),
                                });
                                continue;
                            }
                        }
                    }
                };

                for record in &batch {
                    if !writer.append_line(&record.format_line()) {
                        let _ = events.send(WriterEvent::WriteFailure {
                            device_id: key.0.clone(),
                            date: key.1,
                            path: writer.path.clone(),
                            reason: "write failed after reopen attempts".to_string(),
                        });
                    }
                }
                writer.maybe_flush(flush_interval);
            }

            // Seal when the writer's date has rolled past and its inbox is
            // drained: the file is idle and strictly before today.
            if key.1 < today() {
                if let Some(mut writer) = writers.remove(key) {
                    if inbox.is_empty() {
                        writer.force_flush();
                        drop(writer.file.take());
                        let _ = events.send(WriterEvent::Sealed {
                            device_id: key.0.clone(),
                            date: key.1,
                            path: writer.path.clone(),
                        });
                        slot.keys.lock().retain(|k| k != key);
                        inboxes.lock().remove(key);
                    } else {
                        writers.insert(key.clone(), writer);
                    }
                }
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            let all_drained = slot
                .keys
                .lock()
                .iter()
                .all(|k| inboxes.lock().get(k).map(|ib| ib.is_empty()).unwrap_or(true));
            if all_drained {
                for (_, mut writer) in writers.drain() {
                    writer.force_flush();
                }
                break;
            }
        }

        if !did_work {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

pub fn device_file_path(base: &std::path::Path, device_id: &str, date: chrono::NaiveDate) -> PathBuf {
    base.join(device_id).join(format!("{date}.log"))
}
