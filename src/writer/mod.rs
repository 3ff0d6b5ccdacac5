//! Writer Pool (C2): serializes appends to per-device daily files while
//! allowing full parallelism across devices.
//!
//! The pool generalizes the teacher's single global async-writer channel
//! (`backend::async::start_async_writer_if_needed`, one `crossbeam_channel`
//! draining into one file) into one bounded inbox per `(device_id, date)`
//! key, each drained by exactly one worker. Once the configured pool size
//! is reached, additional keys are assigned round-robin onto an existing
//! worker thread instead of spawning a new one, matching the spec's
//! "pool-managed cooperative writer" overflow behavior.

mod inbox;
mod pool;
mod worker;

pub use inbox::Inbox;
pub use pool::{WriterEvent, WriterPool};

/// Dispatch key: one sequential writer per device per day.
pub type Key = (String, chrono::NaiveDate);
