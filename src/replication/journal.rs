//! Journaled replication queue
//!
//! Every pushed event is written as one checksummed file,
//! `<root>/<lane>/<seq>.json`, before it becomes visible to `pop`. A popped
//! event stays on disk until it is acknowledged, so whatever was queued or
//! in flight when the process died is replayed on the next open, in
//! sequence order per lane. Delivery is at least once; the backup applies
//! are idempotent.
//!
//! Acknowledgements settle the oldest popped event of a lane, which holds
//! for the single consumer the service runs.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::core::CancelSignal;
use crate::observability::Logger;
use crate::storage::{open_book, seal_book, sync_dir, write_durably, Book, StorageError};

use super::errors::{QueueError, QueueResult};
use super::queue::{Lane, MemoryQueue, PopFuture, ReplicationQueue};

/// Journal directory name under the backup tier's directory
pub const JOURNAL_DIR: &str = "queue";

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Default)]
struct LaneJournal {
    pending: VecDeque<u64>,
    in_flight: VecDeque<u64>,
}

/// Durable queue: an in-process [`MemoryQueue`] backed by a file journal
#[derive(Debug)]
pub struct JournalQueue {
    root: PathBuf,
    memory: MemoryQueue,
    journal: Mutex<HashMap<Lane, LaneJournal>>,
    next_seq: AtomicU64,
    logger: Logger,
}

fn unavailable(err: impl ToString) -> QueueError {
    QueueError::Unavailable(err.to_string())
}

impl JournalQueue {
    /// Open the journal under `root`, replaying every unacknowledged event
    ///
    /// Unreadable entries are logged and left on disk.
    pub fn open(root: impl Into<PathBuf>, capacity: usize, logger: Logger) -> io::Result<Self> {
        let root = root.into();
        let memory = MemoryQueue::new(capacity);
        let mut journal = HashMap::new();
        let mut last_seq = 0;
        let mut replayed = 0usize;

        for lane in Lane::ALL {
            let dir = root.join(lane.as_str());
            fs::create_dir_all(&dir)?;

            let mut lane_journal = LaneJournal::default();
            for (seq, path) in entries(&dir)? {
                last_seq = last_seq.max(seq);
                let book = fs::read(&path)
                    .map_err(StorageError::from)
                    .and_then(|bytes| open_book(&bytes, &path.display().to_string()));
                match book {
                    Ok(book) => {
                        memory.restore(lane, book);
                        lane_journal.pending.push_back(seq);
                        replayed += 1;
                    }
                    Err(err) => logger.error(
                        "queue: skipping unreadable journal entry",
                        &[
                            ("lane", lane.as_str()),
                            ("entry", &path.display().to_string()),
                            ("error", &err.to_string()),
                        ],
                    ),
                }
            }
            journal.insert(lane, lane_journal);
        }

        if replayed > 0 {
            logger.info(
                "queue: replayed journaled events",
                &[("events", &replayed.to_string())],
            );
        }

        Ok(Self {
            root,
            memory,
            journal: Mutex::new(journal),
            next_seq: AtomicU64::new(last_seq + 1),
            logger,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Lane, LaneJournal>> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry_path(&self, lane: Lane, seq: u64) -> PathBuf {
        self.root
            .join(lane.as_str())
            .join(format!("{:020}.{}", seq, ENTRY_EXTENSION))
    }

    /// Items waiting on `lane`, in flight ones excluded
    pub fn len(&self, lane: Lane) -> usize {
        self.memory.len(lane)
    }

    /// Events journaled on `lane` and not yet acknowledged
    pub fn unacknowledged(&self, lane: Lane) -> usize {
        self.lock()
            .get(&lane)
            .map_or(0, |j| j.pending.len() + j.in_flight.len())
    }
}

/// Journal entries of `dir` ordered by sequence number
fn entries(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        let seq = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(seq) = seq {
            found.push((seq, path));
        }
    }
    found.sort_unstable_by_key(|(seq, _)| *seq);
    Ok(found)
}

impl ReplicationQueue for JournalQueue {
    fn push(&self, lane: Lane, book: Book) -> QueueResult<()> {
        let mut journal = self.lock();
        if self.memory.len(lane) >= self.memory.capacity() {
            return Err(QueueError::Full {
                lane,
                capacity: self.memory.capacity(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let path = self.entry_path(lane, seq);
        let bytes = seal_book(&book).map_err(unavailable)?;
        write_durably(&path, &bytes).map_err(unavailable)?;

        if let Err(err) = self.memory.push(lane, book) {
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        journal.entry(lane).or_default().pending.push_back(seq);
        Ok(())
    }

    fn pop<'a>(&'a self, lanes: &'a [Lane], cancel: &'a CancelSignal) -> PopFuture<'a> {
        Box::pin(async move {
            let (lane, book) = self.memory.pop(lanes, cancel).await?;
            let mut journal = self.lock();
            let lane_journal = journal.entry(lane).or_default();
            if let Some(seq) = lane_journal.pending.pop_front() {
                lane_journal.in_flight.push_back(seq);
            }
            Ok((lane, book))
        })
    }

    fn ack(&self, lane: Lane) -> QueueResult<()> {
        let seq = self
            .lock()
            .get_mut(&lane)
            .and_then(|j| j.in_flight.pop_front());
        let Some(seq) = seq else {
            self.logger
                .warn("queue: acknowledgement without event in flight", &[("lane", lane.as_str())]);
            return Ok(());
        };

        match fs::remove_file(self.entry_path(lane, seq)) {
            Ok(()) => {
                sync_dir(&self.root.join(lane.as_str()));
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }
}
