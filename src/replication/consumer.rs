//! Replication consumer
//!
//! Single background loop applying queued events to the backup tier.
//! Each event is acknowledged once handled. Failed applies are logged and
//! dropped; there is no retry. Queue errors
//! are logged and the pop is retried after a short pause. The loop exits
//! once its cancel signal fires.

use std::sync::Arc;
use std::time::Duration;

use crate::core::CancelSignal;
use crate::observability::Logger;
use crate::storage::{Book, BookStorage, StorageError};

use super::queue::{Lane, ReplicationQueue};

/// Pause before popping again after a queue error
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Drains the replication queue into the backup store
pub struct Consumer {
    logger: Logger,
    queue: Arc<dyn ReplicationQueue>,
    backup: Arc<dyn BookStorage>,
    retry_delay: Duration,
}

impl Consumer {
    pub fn new(logger: Logger, queue: Arc<dyn ReplicationQueue>, backup: Arc<dyn BookStorage>) -> Self {
        Self {
            logger,
            queue,
            backup,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the pause after a queue error
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Pop from `lanes` and apply each event until `cancel` fires
    pub async fn consume(&self, cancel: CancelSignal, lanes: &[Lane]) {
        self.logger.info(
            "consumer: started",
            &[(
                "lanes",
                &lanes.iter().map(Lane::as_str).collect::<Vec<_>>().join(","),
            )],
        );

        loop {
            let (lane, book) = match self.queue.pop(lanes, &cancel).await {
                Ok(item) => item,
                Err(err) if cancel.is_cancelled() => {
                    self.logger.info(
                        "consumer: queue pop call: cancelled: exit",
                        &[("reason", &err.to_string())],
                    );
                    return;
                }
                Err(err) => {
                    self.logger
                        .error("consumer: error on queue pop call", &[("error", &err.to_string())]);
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = cancel.cancelled() => {}
                    }
                    continue;
                }
            };

            self.apply(lane, book).await;
        }
    }

    async fn apply(&self, lane: Lane, book: Book) {
        let backup = Arc::clone(&self.backup);
        let queue = Arc::clone(&self.queue);
        let id = book.id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let applied = match lane {
                Lane::Creation => backup.add(&book.id, &book),
                Lane::Updating => backup.update(&book.id, &book).map(|_| ()),
                Lane::Deletion => backup.delete(&book.id),
            };
            // failed applies are dropped, so the event is settled either way
            (applied, queue.ack(lane))
        })
        .await;

        let (applied, settled) = match outcome {
            Ok(pair) => pair,
            Err(err) => (Err(StorageError::Internal(err.to_string())), self.queue.ack(lane)),
        };

        if let Err(err) = settled {
            self.logger.error(
                "consumer: failed to acknowledge event",
                &[("lane", lane.as_str()), ("book.id", &id), ("error", &err.to_string())],
            );
        }

        let Err(err) = applied else {
            self.logger
                .debug("consumer: event applied", &[("lane", lane.as_str()), ("book.id", &id)]);
            return;
        };
        let event = match lane {
            Lane::Creation => "consumer: failed to create",
            Lane::Updating => "consumer: failed to update",
            Lane::Deletion => "consumer: failed to delete",
        };
        self.logger.error(
            event,
            &[("lane", lane.as_str()), ("book.id", &id), ("error", &err.to_string())],
        );
    }
}
