pub mod automation;
pub mod compare;
pub mod dates;
pub mod db;
pub mod errors;
pub mod models;
pub mod predicate;
pub mod service;
pub mod store;

pub use crate::automation::{AutomationEngine, BoxFuture, MailSender, RecordUpdater};
pub use crate::errors::{AppError, AppResult};
pub use crate::service::OpsCore;
pub use crate::store::{KvStore, MemoryKv, ViewStore};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Sets up daily-rolling JSON logs under the host's data directory. Called
/// once by the shell before constructing [`OpsCore`].
pub fn init_tracing(app_data_dir: &Path) -> Result<(), String> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "opsdesk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
