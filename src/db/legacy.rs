use std::path::Path;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::db::introspect::{self, is_safe_ident};
use crate::error::MigrationError;

pub const LEGACY_ALIAS: &str = "legacy";

/// Larger legacy files are not auto-imported; they would blow the migration
/// time budget for a table we only ever copy one row from.
pub const MAX_LEGACY_DB_BYTES: u64 = 50 * 1024 * 1024;

const SETTINGS_TABLE: &str = "settings";
const DEFAULT_USER_ID: i64 = 1;

/// Copy the most relevant settings row out of an older store file into the
/// live store, best-effort. Returns the number of rows copied.
///
/// The attach/copy/normalize/detach window runs on a single pooled connection;
/// an attached alias is never observable from any other connection. The alias
/// is detached even when the copy fails.
pub async fn import_legacy_store(
    pool: &SqlitePool,
    live_db_path: &Path,
    legacy_path: &Path,
) -> Result<u64, MigrationError> {
    check_guards(live_db_path, legacy_path)?;

    let mut conn = pool.acquire().await.map_err(MigrationError::Database)?;
    attach(&mut conn, legacy_path).await?;

    let result = copy_and_normalize(&mut conn).await;

    if let Err(e) = sqlx::query(&format!("DETACH DATABASE {LEGACY_ALIAS}"))
        .execute(&mut *conn)
        .await
    {
        warn!(error = %e, "Failed to detach legacy store");
    }

    result
}

fn check_guards(live_db_path: &Path, legacy_path: &Path) -> Result<(), MigrationError> {
    let meta = std::fs::metadata(legacy_path).map_err(|_| {
        MigrationError::ImportGuardFailure(format!(
            "no legacy store at {}",
            legacy_path.display()
        ))
    })?;
    if meta.len() > MAX_LEGACY_DB_BYTES {
        return Err(MigrationError::ImportGuardFailure(format!(
            "legacy store is {} bytes (limit {MAX_LEGACY_DB_BYTES})",
            meta.len()
        )));
    }
    if let (Ok(legacy), Ok(live)) = (legacy_path.canonicalize(), live_db_path.canonicalize()) {
        if legacy == live {
            return Err(MigrationError::ImportGuardFailure(
                "legacy store is the live store".to_string(),
            ));
        }
    }
    Ok(())
}

async fn attach(conn: &mut SqliteConnection, legacy_path: &Path) -> Result<(), MigrationError> {
    let path = legacy_path.to_str().ok_or_else(|| {
        MigrationError::ImportFailure("legacy path is not valid UTF-8".to_string())
    })?;
    let sql = format!(
        "ATTACH DATABASE '{}' AS {LEGACY_ALIAS}",
        path.replace('\'', "''")
    );
    sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| MigrationError::ImportFailure(format!("attach failed: {e}")))?;
    Ok(())
}

async fn copy_and_normalize(conn: &mut SqliteConnection) -> Result<u64, MigrationError> {
    let live = columns_or_empty(conn, SETTINGS_TABLE).await;
    let legacy = columns_or_empty(conn, &format!("{LEGACY_ALIAS}.{SETTINGS_TABLE}")).await;
    if live.is_empty() || legacy.is_empty() {
        return Err(MigrationError::ImportFailure(format!(
            "nothing to reconcile (live has {} columns, legacy has {})",
            live.len(),
            legacy.len()
        )));
    }
    for name in live.iter().chain(legacy.iter()) {
        if !is_safe_ident(name) {
            return Err(MigrationError::ImportFailure(format!(
                "unsafe column name '{name}'"
            )));
        }
    }

    let plan = build_import_plan(&live, &legacy);
    let sql = plan_sql(&plan);
    let rows = sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| MigrationError::ImportFailure(format!("copy failed: {e}")))?
        .rows_affected();
    info!(rows, "Imported settings from legacy store");

    normalize_settings(conn, &live).await;
    Ok(rows)
}

async fn columns_or_empty(conn: &mut SqliteConnection, table_ref: &str) -> Vec<String> {
    match introspect::table_columns(conn, table_ref).await {
        Ok(columns) => columns,
        Err(e) => {
            warn!(table = table_ref, error = %e, "Introspection failed; treating table as empty");
            Vec::new()
        }
    }
}

/// Per-target-column source expressions for the cross-database copy. The
/// column list is exactly the live table's columns; a column the legacy table
/// lacks reads as a literal NULL (which `INSERT OR REPLACE` resolves to the
/// column default where one is declared).
#[derive(Debug)]
pub(crate) struct ImportPlan {
    pub columns: Vec<String>,
    pub sources: Vec<String>,
    pub scoped_to_user: bool,
    pub ordered_by_id: bool,
}

pub(crate) fn build_import_plan(live: &[String], legacy: &[String]) -> ImportPlan {
    let sources = live
        .iter()
        .map(|column| {
            if legacy.iter().any(|l| l == column) {
                column.clone()
            } else {
                "NULL".to_string()
            }
        })
        .collect();
    ImportPlan {
        columns: live.to_vec(),
        sources,
        scoped_to_user: legacy.iter().any(|l| l == "user_id"),
        ordered_by_id: legacy.iter().any(|l| l == "id"),
    }
}

/// One row only: the latest row (by primary key) within the default user
/// scope. A settings table is a singleton per user; importing history rows
/// would just churn it.
pub(crate) fn plan_sql(plan: &ImportPlan) -> String {
    let mut sql = format!(
        "INSERT OR REPLACE INTO {SETTINGS_TABLE} ({}) SELECT {} FROM {LEGACY_ALIAS}.{SETTINGS_TABLE}",
        plan.columns.join(", "),
        plan.sources.join(", ")
    );
    if plan.scoped_to_user {
        sql.push_str(&format!(" WHERE user_id = {DEFAULT_USER_ID}"));
    }
    if plan.ordered_by_id {
        sql.push_str(" ORDER BY id DESC");
    }
    sql.push_str(" LIMIT 1");
    sql
}

/// Fold free-text legacy themes into the closed set the UI understands, and
/// keep the boolean companion flags consistent with the canonical value.
/// Every step checks column existence first and fails soft on its own.
async fn normalize_settings(conn: &mut SqliteConnection, live: &[String]) {
    let has = |name: &str| live.iter().any(|c| c == name);
    if !has("theme") {
        return;
    }

    best_effort(conn, "UPDATE settings SET theme = lower(trim(theme)) WHERE theme IS NOT NULL")
        .await;
    best_effort(conn, "UPDATE settings SET theme = 'dark' WHERE theme LIKE '%dark%'").await;
    best_effort(
        conn,
        "UPDATE settings SET theme = 'light' WHERE theme IN ('', 'main', 'default')",
    )
    .await;

    if has("dark_mode") {
        best_effort(
            conn,
            "UPDATE settings SET dark_mode = CASE WHEN theme = 'dark' THEN 1 ELSE 0 END \
             WHERE theme IS NOT NULL",
        )
        .await;
    }
    // One-way: a non-contrast theme says nothing about the separate
    // accessibility toggle, so it is never cleared here.
    if has("high_contrast") {
        best_effort(
            conn,
            "UPDATE settings SET high_contrast = 1 WHERE theme LIKE '%contrast%'",
        )
        .await;
    }
}

async fn best_effort(conn: &mut SqliteConnection, sql: &str) {
    if let Err(e) = sqlx::query(sql).execute(&mut *conn).await {
        warn!(error = %MigrationError::statement(sql, &e), "Normalization step failed; continuing");
    }
}
