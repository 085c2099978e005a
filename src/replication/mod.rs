//! Replication to the backup tier
//!
//! Every successful primary mutation enqueues one event; a single
//! background consumer applies the events to the backup store. Enqueued
//! events are journaled to disk and survive a restart until applied.
//! Failed applies are dropped after logging, and the backup tier is only
//! eventually consistent with the primary.

mod consumer;
mod errors;
mod journal;
mod queue;

pub use consumer::{Consumer, DEFAULT_RETRY_DELAY};
pub use errors::{QueueError, QueueResult};
pub use journal::{JournalQueue, JOURNAL_DIR};
pub use queue::{Lane, MemoryQueue, PopFuture, ReplicationQueue};
