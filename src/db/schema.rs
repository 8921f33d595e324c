use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::MigrationError;

/// Base schema for a current store. Every statement is `IF NOT EXISTS`, so the
/// script is a no-op against an already-current database.
pub const BASE_SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchemaReport {
    pub applied: usize,
    pub failed: usize,
}

/// Resolve the schema script: the configured override file if present, else the
/// embedded script. An override that cannot be read disables schema application
/// for this run.
pub fn load_script(config: &StoreConfig) -> Result<String, MigrationError> {
    match &config.schema_path {
        Some(raw) => {
            let path = shellexpand::tilde(raw).into_owned();
            std::fs::read_to_string(&path)
                .map_err(|e| MigrationError::ResourceNotFound(format!("{path}: {e}")))
        }
        None => Ok(BASE_SCHEMA.to_string()),
    }
}

/// Individual statements of a schema script: split on `;`, trimmed, empties
/// dropped.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The canonical `CREATE TABLE` statement for `table`, as written in the
/// script. Used by table rebuilds to recreate the current definition.
pub fn create_statement_for(script: &str, table: &str) -> Option<String> {
    split_statements(script)
        .into_iter()
        .find(|stmt| {
            let tokens: Vec<&str> = stmt.split_whitespace().take(7).collect();
            matches!(
                tokens.as_slice(),
                [create, tbl, if_, not, exists, name, ..]
                    if create.eq_ignore_ascii_case("create")
                        && tbl.eq_ignore_ascii_case("table")
                        && if_.eq_ignore_ascii_case("if")
                        && not.eq_ignore_ascii_case("not")
                        && exists.eq_ignore_ascii_case("exists")
                        && name.trim_matches('"').trim_end_matches('(') == table
            )
        })
        .map(str::to_string)
}

/// Execute every statement of the script, best-effort. A failing statement is
/// logged and does not abort its siblings: partial schema presence is
/// preferable to none.
pub async fn apply_script(pool: &SqlitePool, script: &str) -> SchemaReport {
    let mut report = SchemaReport::default();
    for stmt in split_statements(script) {
        match sqlx::query(stmt).execute(pool).await {
            Ok(_) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                warn!(error = %MigrationError::statement(stmt, &e), "Schema statement failed; continuing");
            }
        }
    }
    debug!(
        applied = report.applied,
        failed = report.failed,
        "Base schema applied"
    );
    report
}
