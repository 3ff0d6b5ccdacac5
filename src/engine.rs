//! Background engine scheduler. Each engine (Signer, Archiver, Retention
//! Sweeper) runs on its own interval-loop thread; a crash or stall in one
//! never halts the others, per the error-handling design's "engine
//! failures are local" rule.

use crate::archiver::Archiver;
use crate::retention::RetentionSweeper;
use crate::signer::Signer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct EngineScheduler {
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl EngineScheduler {
    /// Spawns one thread per engine, each sleeping in small increments so it
    /// can observe shutdown promptly rather than oversleeping past the
    /// grace period.
    pub fn start(signer: Arc<Signer>, archiver: Arc<Archiver>, retention: Arc<RetentionSweeper>, config: &crate::config::Config) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();

        threads.push(spawn_loop(
            "signer",
            Duration::from_secs(config.sign_interval_seconds),
            shutdown.clone(),
            move || {
                if let Err(e) = signer.sweep() {
                    tracing::error!(error = %e, engine = "signer", "sweep failed");
                }
            },
        ));

        threads.push(spawn_loop(
            "archiver",
            Duration::from_secs(config.archive_interval_seconds),
            shutdown.clone(),
            move || {
                if let Err(e) = archiver.sweep() {
                    tracing::error!(error = %e, engine = "archiver", "sweep failed");
                }
            },
        ));

        threads.push(spawn_loop(
            "retention",
            Duration::from_secs(config.retention_sweep_interval_seconds),
            shutdown.clone(),
            move || {
                let today = chrono::Utc::now().date_naive();
                if let Err(e) = retention.sweep(today) {
                    tracing::error!(error = %e, engine = "retention", "sweep failed");
                }
            },
        ));

        EngineScheduler { shutdown, threads }
    }

    /// Cooperative shutdown: each loop finishes its in-flight sweep and
    /// exits; a 30-second grace cap applies, after which unfinished threads
    /// are detached (their work resumes on next start, since every sweep is
    /// idempotent).
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let deadline = std::time::Instant::now() + SHUTDOWN_GRACE;
        for handle in self.threads.drain(..) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                drop(handle);
            } else {
                let _ = handle.join();
            }
        }
    }
}

fn spawn_loop(
    name: &'static str,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    mut tick: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut last_run = std::time::Instant::now() - interval; // run once immediately
        while !shutdown.load(Ordering::Relaxed) {
            if last_run.elapsed() >= interval {
                tracing::debug!(engine = name, "running sweep");
                tick();
                last_run = std::time::Instant::now();
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    })
}
