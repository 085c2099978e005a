//! Replication work queue
//!
//! Three lanes (creation, updating, deletion), FIFO within a lane.
//! `push` never blocks; `pop` waits until one of the requested lanes has
//! an item or the caller's cancel signal fires.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::core::CancelSignal;
use crate::storage::Book;

use super::errors::{QueueError, QueueResult};

/// Named sub-queue of the replication queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Creation,
    Updating,
    Deletion,
}

impl Lane {
    /// Every lane, in consumer order
    pub const ALL: [Lane; 3] = [Lane::Creation, Lane::Updating, Lane::Deletion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Creation => "creation",
            Lane::Updating => "updating",
            Lane::Deletion => "deletion",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creation" => Ok(Lane::Creation),
            "updating" => Ok(Lane::Updating),
            "deletion" => Ok(Lane::Deletion),
            other => Err(format!("unknown queue lane '{}'", other)),
        }
    }
}

/// Future returned by [`ReplicationQueue::pop`]
pub type PopFuture<'a> = Pin<Box<dyn Future<Output = QueueResult<(Lane, Book)>> + Send + 'a>>;

/// Work queue feeding the backup tier
pub trait ReplicationQueue: Send + Sync {
    /// Enqueue `book` on `lane` without blocking
    fn push(&self, lane: Lane, book: Book) -> QueueResult<()>;

    /// Wait for the first item of any of `lanes`, checked in the given order
    ///
    /// Resolves to [`QueueError::Cancelled`] once `cancel` fires.
    fn pop<'a>(&'a self, lanes: &'a [Lane], cancel: &'a CancelSignal) -> PopFuture<'a>;

    /// Settle the oldest popped event of `lane` once it has been handled
    fn ack(&self, lane: Lane) -> QueueResult<()> {
        let _ = lane;
        Ok(())
    }
}

/// In-process queue with bounded lanes
#[derive(Debug)]
pub struct MemoryQueue {
    lanes: Mutex<HashMap<Lane, VecDeque<Book>>>,
    capacity: usize,
    notify: Notify,
}

impl MemoryQueue {
    /// Queue holding at most `capacity` items per lane
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Lane, VecDeque<Book>>> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Per-lane capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Put back an item recovered from a journal, ignoring the capacity
    pub(crate) fn restore(&self, lane: Lane, book: Book) {
        self.lock().entry(lane).or_default().push_back(book);
        self.notify.notify_waiters();
    }

    /// Items waiting on `lane`
    pub fn len(&self, lane: Lane) -> usize {
        self.lock().get(&lane).map_or(0, VecDeque::len)
    }

    /// Whether every lane is empty
    pub fn is_empty(&self) -> bool {
        self.lock().values().all(VecDeque::is_empty)
    }

    fn try_pop(&self, lanes: &[Lane]) -> Option<(Lane, Book)> {
        let mut queues = self.lock();
        lanes.iter().find_map(|lane| {
            queues
                .get_mut(lane)
                .and_then(VecDeque::pop_front)
                .map(|book| (*lane, book))
        })
    }
}

impl ReplicationQueue for MemoryQueue {
    fn push(&self, lane: Lane, book: Book) -> QueueResult<()> {
        {
            let mut queues = self.lock();
            let queue = queues.entry(lane).or_default();
            if queue.len() >= self.capacity {
                return Err(QueueError::Full {
                    lane,
                    capacity: self.capacity,
                });
            }
            queue.push_back(book);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn pop<'a>(&'a self, lanes: &'a [Lane], cancel: &'a CancelSignal) -> PopFuture<'a> {
        Box::pin(async move {
            loop {
                // register before checking so a concurrent push is not missed
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(item) = self.try_pop(lanes) {
                    return Ok(item);
                }
                if cancel.is_cancelled() {
                    return Err(QueueError::Cancelled);
                }

                tokio::select! {
                    _ = &mut notified => {}
                    _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn book(id: &str) -> Book {
        Book::with_id(id)
    }

    #[test]
    fn test_lane_names() {
        assert_eq!(Lane::Creation.to_string(), "creation");
        assert_eq!("deletion".parse::<Lane>().unwrap(), Lane::Deletion);
        assert!("unknown".parse::<Lane>().is_err());
    }

    #[tokio::test]
    async fn test_fifo_within_lane() {
        let queue = MemoryQueue::new(10);
        queue.push(Lane::Creation, book("b:1")).unwrap();
        queue.push(Lane::Creation, book("b:2")).unwrap();

        let cancel = CancelSignal::new();
        let (_, first) = queue.pop(&Lane::ALL, &cancel).await.unwrap();
        let (_, second) = queue.pop(&Lane::ALL, &cancel).await.unwrap();
        assert_eq!(first.id, "b:1");
        assert_eq!(second.id, "b:2");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_lanes_checked_in_given_order() {
        let queue = MemoryQueue::new(10);
        queue.push(Lane::Deletion, book("b:del")).unwrap();
        queue.push(Lane::Creation, book("b:new")).unwrap();

        let cancel = CancelSignal::new();
        let (lane, item) = queue
            .pop(&[Lane::Deletion, Lane::Creation], &cancel)
            .await
            .unwrap();
        assert_eq!((lane, item.id.as_str()), (Lane::Deletion, "b:del"));

        // lanes not asked for are left alone
        queue.push(Lane::Deletion, book("b:del2")).unwrap();
        let (lane, _) = queue.pop(&[Lane::Creation], &cancel).await.unwrap();
        assert_eq!(lane, Lane::Creation);
        assert_eq!(queue.len(Lane::Deletion), 1);
    }

    #[test]
    fn test_push_fails_when_full() {
        let queue = MemoryQueue::new(1);
        queue.push(Lane::Updating, book("b:1")).unwrap();
        assert_eq!(
            queue.push(Lane::Updating, book("b:2")),
            Err(QueueError::Full {
                lane: Lane::Updating,
                capacity: 1
            })
        );
        queue.push(Lane::Creation, book("b:3")).unwrap();
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(MemoryQueue::new(10));
        let cancel = CancelSignal::new();

        let waiter = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.pop(&Lane::ALL, &cancel).await })
        };
        tokio::task::yield_now().await;
        queue.push(Lane::Updating, book("b:9")).unwrap();

        let (lane, item) = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pop must wake")
            .unwrap()
            .unwrap();
        assert_eq!(lane, Lane::Updating);
        assert_eq!(item.id, "b:9");
    }

    #[tokio::test]
    async fn test_pop_returns_cancelled() {
        let queue = Arc::new(MemoryQueue::new(10));
        let cancel = CancelSignal::new();

        let waiter = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.pop(&Lane::ALL, &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pop must observe cancel")
            .unwrap();
        assert_eq!(outcome, Err(QueueError::Cancelled));
    }
}
