//! Application bootstrap
//!
//! Wires the storage tiers, the replication queue and consumer, and the
//! shared request state, then runs the HTTP server until a shutdown
//! signal arrives.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::core::CancelSignal;
use crate::http_server::{AppState, HttpServer};
use crate::ids::UuidGenerator;
use crate::observability::{Logger, Maintenance, Statistics};
use crate::replication::{Consumer, JournalQueue, Lane, JOURNAL_DIR};
use crate::storage::{BookService, FileBookStorage, MemoryBookStorage, StorageResult};

/// Everything a running instance is made of
pub struct App {
    pub state: Arc<AppState>,
    pub consumer: Arc<Consumer>,
}

impl App {
    /// Build an instance from `config`
    ///
    /// The backup tier lives under `config.storage.backup_dir`, with the
    /// replication journal in its `queue` subdirectory. Events left in the
    /// journal by a previous run are queued again for the consumer.
    pub fn assemble(config: AppConfig, logger: Logger, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let backup_dir = Path::new(&config.storage.backup_dir);
        let primary = Arc::new(MemoryBookStorage::new());
        let backup = Arc::new(FileBookStorage::open(backup_dir, logger.clone())?);
        let queue = Arc::new(JournalQueue::open(
            backup_dir.join(JOURNAL_DIR),
            config.storage.queue_capacity,
            logger.clone(),
        )?);

        let service = Arc::new(BookService::new(
            logger.clone(),
            Arc::clone(&clock),
            primary,
            backup.clone(),
            queue.clone(),
        ));
        let consumer = Arc::new(Consumer::new(logger.clone(), queue, backup));

        let state = Arc::new(AppState {
            stats: Arc::new(Statistics::new(clock.now())),
            maintenance: Arc::new(Maintenance::new()),
            ids: Arc::new(UuidGenerator),
            config,
            logger,
            service,
            clock,
        });
        Ok(Self { state, consumer })
    }

    /// Build an instance on the system clock
    pub fn with_system_clock(config: AppConfig, logger: Logger) -> StorageResult<Self> {
        Self::assemble(config, logger, Arc::new(SystemClock))
    }

    /// Serve until `shutdown` resolves
    ///
    /// The consumer drains every lane in the background and is cancelled
    /// once the server stops. It gets the configured shutdown timeout to
    /// finish the event in hand.
    pub async fn run<S>(self, shutdown: S) -> std::io::Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let logger = self.state.logger.clone();
        let grace = self.state.config.server.shutdown_timeout();

        let stop = CancelSignal::new();
        let consumer = Arc::clone(&self.consumer);
        let signal = stop.clone();
        let consumer_task = tokio::spawn(async move {
            consumer.consume(signal, &Lane::ALL).await;
        });

        let served = HttpServer::new(Arc::clone(&self.state)).start(shutdown).await;

        logger.info("shutting down replication consumer", &[]);
        stop.cancel();
        match tokio::time::timeout(grace, consumer_task).await {
            Ok(Ok(())) => logger.info("replication consumer stopped", &[]),
            Ok(Err(err)) => logger.error(
                "replication consumer task failed",
                &[("error", &err.to_string())],
            ),
            Err(_) => logger.warn(
                "replication consumer did not stop in time",
                &[("timeout", &format!("{}s", grace.as_secs()))],
            ),
        }
        served
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
pub async fn shutdown_signal(logger: Logger) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            logger.error("failed to listen for ctrl-c", &[("error", &err.to_string())]);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    logger.info("shutdown signal received", &[]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.storage.backup_dir = dir.path().join("books").display().to_string();
        config
    }

    #[test]
    fn test_assemble_creates_backup_dir() {
        let dir = TempDir::new().unwrap();
        let app = App::assemble(
            config(&dir),
            Logger::discard(),
            Arc::new(FixedClock::new(Utc::now())),
        )
        .unwrap();
        assert!(dir.path().join("books").is_dir());
        assert!(dir.path().join("books").join(JOURNAL_DIR).join("creation").is_dir());
        assert_eq!(app.state.stats.calls(), 0);
        assert!(!app.state.maintenance.is_enabled());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::memory(crate::observability::Severity::Info);
        let app = App::with_system_clock(config(&dir), logger.clone()).unwrap();

        app.run(async {}).await.unwrap();

        let lines = logger.lines();
        assert!(lines.iter().any(|l| l.contains("http server listening")));
        assert!(lines.iter().any(|l| l.contains("replication consumer stopped")));
    }
}
