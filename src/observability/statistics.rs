//! Request statistics
//!
//! - Call counter is atomic; its value doubles as the request sequence number
//! - Status histogram is guarded by a reader/writer lock
//! - Lives for the whole process, never persisted

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Process-wide request statistics
///
/// Shared behind an `Arc` and handed to the pipeline, never a global.
#[derive(Debug)]
pub struct Statistics {
    started: DateTime<Utc>,
    version: String,
    platform: String,
    container: bool,
    called: AtomicU64,
    lingering: AtomicU64,
    status: RwLock<BTreeMap<u16, u64>>,
}

impl Statistics {
    /// Create statistics for a process started at `started`
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            container: std::path::Path::new("/.dockerenv").exists(),
            called: AtomicU64::new(0),
            lingering: AtomicU64::new(0),
            status: RwLock::new(BTreeMap::new()),
        }
    }

    /// Count one more call and return the new total
    pub fn increment_calls(&self) -> u64 {
        self.called.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total calls so far
    pub fn calls(&self) -> u64 {
        self.called.load(Ordering::Relaxed)
    }

    /// Count one finalized response with the given status
    pub fn record_status(&self, code: u16) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        *status.entry(code).or_insert(0) += 1;
    }

    /// Copy of the status histogram
    pub fn snapshot(&self) -> BTreeMap<u16, u64> {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// One more handler left running past its response
    pub fn handler_abandoned(&self) -> u64 {
        self.lingering.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// An abandoned handler finished
    pub fn abandoned_handler_finished(&self) {
        let _ = self
            .lingering
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Handlers currently running after their response was finalized by the guard
    pub fn lingering_handlers(&self) -> u64 {
        self.lingering.load(Ordering::Relaxed)
    }

    /// Process start time
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Time elapsed since start, in whole minutes
    pub fn uptime_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started).num_minutes()
    }

    /// Crate version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `os/arch`
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Whether the process runs inside a container
    pub fn container(&self) -> bool {
        self.container
    }
}
