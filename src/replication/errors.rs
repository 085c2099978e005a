//! Replication queue errors

use thiserror::Error;

use super::queue::Lane;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Replication queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The lane reached its capacity
    #[error("queue lane {lane} is full (capacity {capacity})")]
    Full { lane: Lane, capacity: usize },

    /// The waiting pop was cancelled
    #[error("queue pop cancelled")]
    Cancelled,

    /// The queue backend failed
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
