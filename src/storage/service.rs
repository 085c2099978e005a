//! Dual-tier book service
//!
//! Reads hit the primary tier and fall back to the backup tier, backfilling
//! the primary on a hit. Mutations go to the primary and enqueue one
//! replication event; the consumer applies it to the backup later.
//! Enqueue failures are logged and never undo the primary write.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::{rfc3339, Clock};
use crate::observability::Logger;
use crate::replication::{Lane, ReplicationQueue};

use super::book::{Book, BookStorage};
use super::errors::{StorageError, StorageResult};

/// Upper bound for a cache clear
pub const CACHE_CLEAR_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Interval between "still running" logs during a cache clear
pub const CACHE_CLEAR_PROGRESS: Duration = Duration::from_secs(30);

/// Book operations over the primary and backup tiers
pub struct BookService {
    logger: Logger,
    clock: Arc<dyn Clock>,
    primary: Arc<dyn BookStorage>,
    backup: Arc<dyn BookStorage>,
    queue: Arc<dyn ReplicationQueue>,
    clear_timeout: Duration,
    clear_progress: Duration,
}

impl BookService {
    pub fn new(
        logger: Logger,
        clock: Arc<dyn Clock>,
        primary: Arc<dyn BookStorage>,
        backup: Arc<dyn BookStorage>,
        queue: Arc<dyn ReplicationQueue>,
    ) -> Self {
        Self {
            logger,
            clock,
            primary,
            backup,
            queue,
            clear_timeout: CACHE_CLEAR_TIMEOUT,
            clear_progress: CACHE_CLEAR_PROGRESS,
        }
    }

    /// Override the cache clear timeout and progress interval
    pub fn with_clear_timings(mut self, timeout: Duration, progress: Duration) -> Self {
        self.clear_timeout = timeout;
        self.clear_progress = progress;
        self
    }

    fn enqueue(&self, lane: Lane, book: Book) {
        let id = book.id.clone();
        if let Err(err) = self.queue.push(lane, book) {
            self.logger.error(
                "service: failed to push book to queue",
                &[("qid", lane.as_str()), ("book.id", &id), ("error", &err.to_string())],
            );
        }
    }

    /// Store a new book, then replicate it
    pub fn add(&self, id: &str, book: &Book) -> StorageResult<()> {
        self.primary.add(id, book)?;
        self.enqueue(Lane::Creation, book.clone());
        Ok(())
    }

    /// Primary first, then backup with a best-effort backfill
    pub fn get_one(&self, id: &str) -> StorageResult<Book> {
        match self.primary.get_one(id) {
            Ok(book) => return Ok(book),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let book = self.backup.get_one(id)?;
        if let Err(err) = self.primary.add(id, &book) {
            self.logger.error(
                "service: failed to cache book into primary storage",
                &[("book.id", id), ("error", &err.to_string())],
            );
        }
        Ok(book)
    }

    /// Remove a book from the primary, then replicate the deletion
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        self.primary.delete(id)?;
        self.enqueue(Lane::Deletion, Book::with_id(id));
        Ok(())
    }

    /// Stamp `updatedAt`, write the primary, then replicate
    pub fn update(&self, id: &str, mut book: Book) -> StorageResult<Book> {
        book.updated_at = rfc3339(self.clock.now());
        let updated = self.primary.update(id, &book)?;
        self.enqueue(Lane::Updating, book);
        Ok(updated)
    }

    /// Backup listing, or the primary one when the backup fails or is empty
    pub fn get_all(&self) -> StorageResult<Vec<Book>> {
        match self.backup.get_all() {
            Ok(books) if !books.is_empty() => Ok(books),
            Ok(_) => self.primary.get_all(),
            Err(err) => {
                self.logger.warn(
                    "service: backup listing failed, using primary storage",
                    &[("error", &err.to_string())],
                );
                self.primary.get_all()
            }
        }
    }

    /// Empty the primary tier
    ///
    /// Runs detached from any request: the caller spawns it. Logs progress
    /// periodically and gives up waiting after the clear timeout.
    pub async fn clear_cache(&self, request_id: &str) -> StorageResult<()> {
        let started = Instant::now();
        let primary = Arc::clone(&self.primary);
        let mut task = tokio::task::spawn_blocking(move || primary.delete_all());

        let deadline = tokio::time::sleep(self.clear_timeout);
        tokio::pin!(deadline);
        let mut progress =
            tokio::time::interval_at(started + self.clear_progress, self.clear_progress);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                joined = &mut task => {
                    let elapsed = format!("{}ms", started.elapsed().as_millis());
                    let outcome = joined
                        .map_err(|e| StorageError::Internal(e.to_string()))
                        .and_then(|result| result);
                    match &outcome {
                        Ok(()) => self.logger.info(
                            "service: books cache clearing completed",
                            &[("request.id", request_id), ("duration", &elapsed)],
                        ),
                        Err(err) => self.logger.error(
                            "service: error clearing books cache",
                            &[
                                ("request.id", request_id),
                                ("duration", &elapsed),
                                ("error", &err.to_string()),
                            ],
                        ),
                    }
                    return outcome;
                }
                _ = &mut deadline => {
                    self.logger.error(
                        "service: timeout clearing books cache",
                        &[
                            ("request.id", request_id),
                            ("duration", &format!("{}ms", started.elapsed().as_millis())),
                        ],
                    );
                    return Err(StorageError::Internal("cache clearing timed out".to_string()));
                }
                _ = progress.tick() => {
                    self.logger.info(
                        "service: books cache clearing still running",
                        &[
                            ("request.id", request_id),
                            ("duration", &format!("{}ms", started.elapsed().as_millis())),
                        ],
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use crate::clock::FixedClock;
    use crate::core::CancelSignal;
    use crate::observability::Severity;
    use crate::replication::{MemoryQueue, QueueError, QueueResult, PopFuture};
    use crate::storage::MemoryBookStorage;

    fn book(id: &str) -> Book {
        Book {
            id: id.into(),
            title: "Dune".into(),
            description: "Desert planet".into(),
            author: "Frank Herbert".into(),
            price: "9.99".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    /// Memory store counting reads, optionally failing listings
    #[derive(Default)]
    struct Probe {
        inner: MemoryBookStorage,
        reads: AtomicUsize,
        fail_listing: AtomicBool,
    }

    impl BookStorage for Probe {
        fn add(&self, id: &str, book: &Book) -> StorageResult<()> {
            self.inner.add(id, book)
        }
        fn get_one(&self, id: &str) -> StorageResult<Book> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_one(id)
        }
        fn delete(&self, id: &str) -> StorageResult<()> {
            self.inner.delete(id)
        }
        fn update(&self, id: &str, book: &Book) -> StorageResult<Book> {
            self.inner.update(id, book)
        }
        fn get_all(&self) -> StorageResult<Vec<Book>> {
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(StorageError::Internal("listing unavailable".into()));
            }
            self.inner.get_all()
        }
        fn delete_all(&self) -> StorageResult<()> {
            self.inner.delete_all()
        }
    }

    struct Fixture {
        primary: Arc<Probe>,
        backup: Arc<Probe>,
        queue: Arc<MemoryQueue>,
        clock: Arc<FixedClock>,
        service: BookService,
    }

    fn fixture() -> Fixture {
        let primary = Arc::new(Probe::default());
        let backup = Arc::new(Probe::default());
        let queue = Arc::new(MemoryQueue::new(16));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let service = BookService::new(
            Logger::discard(),
            clock.clone(),
            primary.clone(),
            backup.clone(),
            queue.clone(),
        );
        Fixture {
            primary,
            backup,
            queue,
            clock,
            service,
        }
    }

    async fn next_event(queue: &MemoryQueue) -> (Lane, Book) {
        let cancel = CancelSignal::new();
        queue.pop(&Lane::ALL, &cancel).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_then_get_from_primary() {
        let f = fixture();
        f.service.add("b:1", &book("b:1")).unwrap();

        assert_eq!(f.service.get_one("b:1").unwrap(), book("b:1"));
        assert_eq!(f.backup.reads.load(Ordering::SeqCst), 0);

        let (lane, event) = next_event(&f.queue).await;
        assert_eq!(lane, Lane::Creation);
        assert_eq!(event, book("b:1"));
    }

    #[test]
    fn test_get_one_backfills_primary() {
        let f = fixture();
        f.backup.inner.add("b:cold", &book("b:cold")).unwrap();

        assert_eq!(f.service.get_one("b:cold").unwrap(), book("b:cold"));
        assert_eq!(f.backup.reads.load(Ordering::SeqCst), 1);

        // second read served by the primary
        assert_eq!(f.service.get_one("b:cold").unwrap(), book("b:cold"));
        assert_eq!(f.backup.reads.load(Ordering::SeqCst), 1);
        assert_eq!(f.primary.inner.len(), 1);
    }

    #[test]
    fn test_get_one_missing_everywhere_is_not_found() {
        let f = fixture();
        assert!(f.service.get_one("b:ghost").unwrap_err().is_not_found());
        assert!(f.primary.inner.is_empty());
    }

    #[tokio::test]
    async fn test_update_stamps_time_and_replicates() {
        let f = fixture();
        f.service.add("b:1", &book("b:1")).unwrap();
        let _ = next_event(&f.queue).await;

        f.clock.advance(chrono::Duration::minutes(3));
        let mut changed = book("b:1");
        changed.title = "Dune Messiah".into();
        let updated = f.service.update("b:1", changed).unwrap();

        assert_eq!(updated.updated_at, "2024-06-01T10:03:00Z");
        assert_eq!(updated.created_at, "2024-01-01T00:00:00Z");
        let (lane, event) = next_event(&f.queue).await;
        assert_eq!(lane, Lane::Updating);
        assert_eq!(event.title, "Dune Messiah");
    }

    #[tokio::test]
    async fn test_delete_replicates_id_only() {
        let f = fixture();
        f.service.add("b:1", &book("b:1")).unwrap();
        let _ = next_event(&f.queue).await;

        f.service.delete("b:1").unwrap();
        let (lane, event) = next_event(&f.queue).await;
        assert_eq!(lane, Lane::Deletion);
        assert_eq!(event, Book::with_id("b:1"));
    }

    #[test]
    fn test_delete_missing_does_not_enqueue() {
        let f = fixture();
        assert!(f.service.delete("b:ghost").unwrap_err().is_not_found());
        assert!(f.queue.is_empty());
    }

    #[test]
    fn test_get_all_prefers_backup() {
        let f = fixture();
        f.primary.inner.add("b:p", &book("b:p")).unwrap();
        f.backup.inner.add("b:b", &book("b:b")).unwrap();

        let all = f.service.get_all().unwrap();
        assert_eq!(all, vec![book("b:b")]);
    }

    #[test]
    fn test_get_all_falls_back_when_backup_empty_or_failing() {
        let f = fixture();
        f.primary.inner.add("b:p", &book("b:p")).unwrap();
        assert_eq!(f.service.get_all().unwrap(), vec![book("b:p")]);

        f.backup.inner.add("b:b", &book("b:b")).unwrap();
        f.backup.fail_listing.store(true, Ordering::SeqCst);
        assert_eq!(f.service.get_all().unwrap(), vec![book("b:p")]);
    }

    struct RejectingQueue;

    impl ReplicationQueue for RejectingQueue {
        fn push(&self, lane: Lane, _book: Book) -> QueueResult<()> {
            Err(QueueError::Full { lane, capacity: 0 })
        }

        fn pop<'a>(&'a self, _lanes: &'a [Lane], _cancel: &'a CancelSignal) -> PopFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    #[test]
    fn test_enqueue_failure_keeps_primary_write() {
        let logger = Logger::memory(Severity::Debug);
        let primary = Arc::new(MemoryBookStorage::new());
        let service = BookService::new(
            logger.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            primary.clone(),
            Arc::new(MemoryBookStorage::new()),
            Arc::new(RejectingQueue),
        );

        service.add("b:1", &book("b:1")).unwrap();
        assert_eq!(primary.get_one("b:1").unwrap(), book("b:1"));
        assert!(logger.lines()[0].contains("service: failed to push book to queue"));
    }

    #[tokio::test]
    async fn test_clear_cache_empties_primary_only() {
        let logger = Logger::memory(Severity::Debug);
        let primary = Arc::new(MemoryBookStorage::new());
        let backup = Arc::new(MemoryBookStorage::new());
        primary.add("b:1", &book("b:1")).unwrap();
        backup.add("b:1", &book("b:1")).unwrap();
        let service = BookService::new(
            logger.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            primary.clone(),
            backup.clone(),
            Arc::new(MemoryQueue::new(4)),
        );

        service.clear_cache("r:ops").await.unwrap();

        assert!(primary.is_empty());
        assert_eq!(backup.len(), 1);
        let last: serde_json::Value =
            serde_json::from_str(logger.lines().last().unwrap()).unwrap();
        assert_eq!(last["event"], "service: books cache clearing completed");
        assert_eq!(last["request.id"], "r:ops");
    }

    /// Primary whose clear blocks for a while
    struct SlowClear {
        delay: std::time::Duration,
    }

    impl BookStorage for SlowClear {
        fn add(&self, _id: &str, _book: &Book) -> StorageResult<()> {
            Ok(())
        }
        fn get_one(&self, id: &str) -> StorageResult<Book> {
            Err(StorageError::NotFound(id.to_string()))
        }
        fn delete(&self, _id: &str) -> StorageResult<()> {
            Ok(())
        }
        fn update(&self, _id: &str, book: &Book) -> StorageResult<Book> {
            Ok(book.clone())
        }
        fn get_all(&self) -> StorageResult<Vec<Book>> {
            Ok(Vec::new())
        }
        fn delete_all(&self) -> StorageResult<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_clear_cache_gives_up_after_timeout() {
        let logger = Logger::memory(Severity::Debug);
        let service = BookService::new(
            logger.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(SlowClear {
                delay: Duration::from_millis(300),
            }),
            Arc::new(MemoryBookStorage::new()),
            Arc::new(MemoryQueue::new(4)),
        )
        .with_clear_timings(Duration::from_millis(120), Duration::from_millis(50));

        let err = service.clear_cache("r:slow").await.unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));

        let lines = logger.lines();
        assert!(lines
            .iter()
            .any(|l| l.contains("service: books cache clearing still running")));
        assert!(lines
            .last()
            .unwrap()
            .contains("service: timeout clearing books cache"));
    }
}
