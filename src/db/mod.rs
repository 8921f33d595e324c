pub mod introspect;
pub mod legacy;
pub mod migrate;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open the live store pool. This is the only step of startup whose failure is
/// fatal: without a database file there is no store to migrate or degrade to.
pub async fn open_pool(db_path: &Path) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    set_db_file_permissions(db_path);

    Ok(pool)
}

/// Set restrictive permissions (owner-only read/write) on the database file and
/// the WAL sidecar files SQLite creates next to it.
fn set_db_file_permissions(db_path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(db_path, mode.clone()) {
            tracing::warn!(path = %db_path.display(), error = %e, "Failed to set permissions on database file");
        }
        for suffix in &["-wal", "-shm"] {
            let sidecar = format!("{}{}", db_path.display(), suffix);
            if Path::new(&sidecar).exists() {
                if let Err(e) = std::fs::set_permissions(&sidecar, mode.clone()) {
                    tracing::warn!(path = %sidecar, error = %e, "Failed to set permissions on sidecar file");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = db_path;
    }
}
