//! Maintenance switch
//!
//! The flag is read lock-free on every public request. Reason and
//! activation time are only touched by the ops endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::rfc1123;

/// Message served while maintenance is on
pub const MAINTENANCE_MESSAGE: &str = "service currently unvailable.";

#[derive(Debug, Default)]
struct Details {
    reason: String,
    since: Option<DateTime<Utc>>,
}

/// Maintenance mode state
#[derive(Debug, Default)]
pub struct Maintenance {
    enabled: AtomicBool,
    details: RwLock<Details>,
}

/// Body returned to public callers while maintenance is on
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MaintenanceNotice {
    pub message: String,
    pub reason: String,
    pub since: String,
}

impl Maintenance {
    /// Create a switch in the off position
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn maintenance on
    pub fn enable(&self, reason: impl Into<String>, now: DateTime<Utc>) {
        {
            let mut details = self.details.write().unwrap_or_else(|e| e.into_inner());
            details.reason = reason.into();
            details.since = Some(now);
        }
        self.enabled.store(true, Ordering::Release);
    }

    /// Turn maintenance off and forget the reason
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        let mut details = self.details.write().unwrap_or_else(|e| e.into_inner());
        details.reason.clear();
        details.since = None;
    }

    /// Hot-path check
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Current reason and activation time
    pub fn show(&self) -> (String, Option<DateTime<Utc>>) {
        let details = self.details.read().unwrap_or_else(|e| e.into_inner());
        (details.reason.clone(), details.since)
    }

    /// Payload for the 503 response
    pub fn notice(&self) -> MaintenanceNotice {
        let (reason, since) = self.show();
        MaintenanceNotice {
            message: MAINTENANCE_MESSAGE.to_string(),
            reason,
            since: since.map(rfc1123).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_starts_disabled() {
        let mode = Maintenance::new();
        assert!(!mode.is_enabled());
        assert_eq!(mode.show(), (String::new(), None));
    }

    #[test]
    fn test_enable_then_disable() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        let mode = Maintenance::new();

        mode.enable("database upgrade", now);
        assert!(mode.is_enabled());
        assert_eq!(mode.show(), ("database upgrade".to_string(), Some(now)));

        let notice = mode.notice();
        assert_eq!(notice.message, "service currently unvailable.");
        assert_eq!(notice.reason, "database upgrade");
        assert_eq!(notice.since, "Sat, 09 Mar 2024 08:30:00 UTC");

        mode.disable();
        assert!(!mode.is_enabled());
        assert_eq!(mode.show(), (String::new(), None));
    }
}
