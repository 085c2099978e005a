//! Book storage
//!
//! Two tiers behind one [`BookStorage`] capability:
//!
//! - [`MemoryBookStorage`]: primary tier, low latency, serves most reads
//! - [`FileBookStorage`]: backup tier, durable, checksummed records on disk
//!
//! [`BookService`] ties them together: read-through with backfill,
//! listing with fallback, and write-behind replication through the queue.

mod book;
mod checksum;
mod errors;
mod file;
mod memory;
mod service;

pub use book::{Book, BookStorage};
pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{StorageError, StorageResult};
pub use file::FileBookStorage;
pub(crate) use file::{open_book, seal_book, sync_dir, write_durably};
pub use memory::MemoryBookStorage;
pub use service::{BookService, CACHE_CLEAR_PROGRESS, CACHE_CLEAR_TIMEOUT};
