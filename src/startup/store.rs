use std::path::PathBuf;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::db::{self, legacy, migrate, schema};
use crate::error::MigrationError;
use crate::repo::{
    BookmarkStore, DownloadStore, HistoryStore, ProfileStore, SettingsStore, TabStore,
};

/// Everything the rest of the application needs from the store, handed out
/// only after the synchronous migration phase has completed.
pub struct StoreBundle {
    pub pool: SqlitePool,
    pub settings: SettingsStore,
    pub tabs: TabStore,
    pub profiles: ProfileStore,
    pub bookmarks: BookmarkStore,
    pub history: HistoryStore,
    pub downloads: DownloadStore,
    pub legacy_import: ImportTask,
}

/// Terminal state of the background legacy import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Completed { rows: u64 },
    Skipped { reason: String },
    Failed { error: String },
    TimedOut,
}

impl From<MigrationError> for ImportStatus {
    fn from(e: MigrationError) -> Self {
        match e {
            MigrationError::ImportGuardFailure(reason) => ImportStatus::Skipped { reason },
            MigrationError::ImportTimeout => ImportStatus::TimedOut,
            other => ImportStatus::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// Handle on the background import. Startup never waits on it; callers that
/// care about the outcome (tests, a diagnostics page) can.
pub struct ImportTask {
    handle: JoinHandle<ImportStatus>,
}

impl ImportTask {
    pub async fn wait(self) -> ImportStatus {
        self.handle.await.unwrap_or(ImportStatus::Failed {
            error: "import supervisor aborted".to_string(),
        })
    }
}

/// Bring the store to a current shape and hand out repositories.
///
/// Schema application and structural migration run to completion before this
/// function returns: the first query any repository issues assumes a
/// structurally correct schema. The legacy import is only *scheduled* here; a
/// settings read immediately after startup may or may not see imported values
/// yet. That race is an accepted eventual-consistency contract: the import is
/// advisory enrichment, never a startup dependency.
///
/// Only the failure to open the database file itself propagates; every
/// migration step degrades to a log line.
pub async fn init_store(config: &StoreConfig) -> anyhow::Result<StoreBundle> {
    let db_path = config.resolve_db_path()?;
    let pool = db::open_pool(&db_path).await?;
    info!(db_path = %db_path.display(), "Store opened");

    let script = match schema::load_script(config) {
        Ok(script) => {
            let report = schema::apply_script(&pool, &script).await;
            info!(
                applied = report.applied,
                failed = report.failed,
                "Base schema applied"
            );
            Some(script)
        }
        Err(e) => {
            warn!(error = %e, "Schema script unavailable; schema application disabled for this run");
            None
        }
    };

    // Rebuilds recreate tables from the same script that was applied; with an
    // unreadable override the embedded script remains the reference.
    let script = script.unwrap_or_else(|| schema::BASE_SCHEMA.to_string());
    match migrate::run(&pool, &script).await {
        Ok(()) => info!("Structural migration complete"),
        Err(e) => warn!(error = %e, "Structural migration aborted"),
    }

    let legacy_import = schedule_legacy_import(
        pool.clone(),
        db_path,
        config.legacy_db_path(),
        config.import_timeout(),
    );

    Ok(StoreBundle {
        settings: SettingsStore::new(pool.clone()),
        tabs: TabStore::new(pool.clone()),
        profiles: ProfileStore::new(pool.clone()),
        bookmarks: BookmarkStore::new(pool.clone()),
        history: HistoryStore::new(pool.clone()),
        downloads: DownloadStore::new(pool.clone()),
        pool,
        legacy_import,
    })
}

fn schedule_legacy_import(
    pool: SqlitePool,
    live_db_path: PathBuf,
    legacy_path: PathBuf,
    budget: Duration,
) -> ImportTask {
    info!(
        legacy = %legacy_path.display(),
        timeout_secs = budget.as_secs(),
        "Legacy import scheduled"
    );
    let worker = tokio::spawn(async move {
        legacy::import_legacy_store(&pool, &live_db_path, &legacy_path).await
    });
    let handle = tokio::spawn(supervise(worker, budget));
    ImportTask { handle }
}

/// Wait on the worker for at most `budget`; past that the worker is cancelled
/// and the import is recorded as timed out. Cancellation is cooperative; a
/// statement already inside SQLite finishes or fails atomically there.
pub(crate) async fn supervise(
    mut worker: JoinHandle<Result<u64, MigrationError>>,
    budget: Duration,
) -> ImportStatus {
    match tokio::time::timeout(budget, &mut worker).await {
        Ok(Ok(Ok(rows))) => {
            info!(rows, "Legacy import completed");
            ImportStatus::Completed { rows }
        }
        Ok(Ok(Err(e))) => {
            match &e {
                MigrationError::ImportGuardFailure(reason) => {
                    info!(reason = %reason, "Legacy import skipped");
                }
                other => {
                    warn!(error = %other, "Legacy import failed");
                }
            }
            ImportStatus::from(e)
        }
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "Legacy import worker died");
            ImportStatus::Failed {
                error: join_err.to_string(),
            }
        }
        Err(_) => {
            worker.abort();
            warn!(error = %MigrationError::ImportTimeout, "Cancelling legacy import");
            ImportStatus::from(MigrationError::ImportTimeout)
        }
    }
}
