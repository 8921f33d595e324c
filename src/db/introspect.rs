use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::MigrationError;

/// Identifier allowlist for names that get formatted into pragma/DDL text.
/// Table and column names in this crate are static or read back from the
/// catalog, but the check keeps a corrupted catalog from reaching SQL text.
pub(crate) fn is_safe_ident(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Live column names of a table, in declaration order.
///
/// `table_ref` may be qualified as `schema.table` to introspect an attached
/// database; the qualified pragma is tried first and falls back to the
/// unqualified form if rejected. A table that does not exist yields an empty
/// list, not an error.
pub async fn table_columns(
    conn: &mut SqliteConnection,
    table_ref: &str,
) -> Result<Vec<String>, MigrationError> {
    let (schema, table) = match table_ref.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, table_ref),
    };

    if !is_safe_ident(table) || schema.is_some_and(|s| !is_safe_ident(s)) {
        return Err(MigrationError::IntrospectionFailure {
            table: table_ref.to_string(),
            detail: "unsafe identifier".to_string(),
        });
    }

    if let Some(schema) = schema {
        let qualified = format!("PRAGMA \"{schema}\".table_info(\"{table}\")");
        match pragma_columns(conn, &qualified).await {
            Ok(columns) => return Ok(columns),
            Err(e) => {
                debug!(table = table_ref, error = %e, "Qualified introspection rejected; retrying unqualified");
            }
        }
    }

    pragma_columns(conn, &format!("PRAGMA table_info(\"{table}\")"))
        .await
        .map_err(|e| MigrationError::IntrospectionFailure {
            table: table_ref.to_string(),
            detail: e.to_string(),
        })
}

async fn pragma_columns(
    conn: &mut SqliteConnection,
    pragma: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(pragma).fetch_all(conn).await?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(row.try_get::<String, _>("name")?);
    }
    Ok(columns)
}
