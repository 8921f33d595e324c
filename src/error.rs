use thiserror::Error;

/// Failure modes of the schema bootstrap and migration engine.
///
/// The engine never lets one of these escape startup as a fatal error; the
/// variants exist so callers and tests can tell *which* step degraded instead
/// of reading opaque catch-all logs.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The schema script override was configured but could not be read.
    /// Schema application is disabled for this run.
    #[error("schema script not found: {0}")]
    ResourceNotFound(String),

    /// A single DDL/DML statement failed. Sibling statements are still
    /// attempted.
    #[error("statement failed ({statement}): {detail}")]
    StatementFailure { statement: String, detail: String },

    /// A catalog query failed. Callers treat the affected table as having no
    /// columns.
    #[error("introspection failed for '{table}': {detail}")]
    IntrospectionFailure { table: String, detail: String },

    /// A legacy-import precondition did not hold (file missing, oversized, or
    /// self-referential). The import is skipped; this is not an error in the
    /// store itself.
    #[error("legacy import skipped: {0}")]
    ImportGuardFailure(String),

    /// The legacy-import worker exceeded its time budget and was cancelled.
    #[error("legacy import exceeded its time budget")]
    ImportTimeout,

    /// The legacy import failed partway through attach/copy/normalize/detach.
    #[error("legacy import failed: {0}")]
    ImportFailure(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub(crate) fn statement(sql: &str, err: &sqlx::Error) -> Self {
        let mut head: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if head.len() > 80 {
            head.truncate(80);
            head.push('…');
        }
        MigrationError::StatementFailure {
            statement: head,
            detail: err.to_string(),
        }
    }
}
