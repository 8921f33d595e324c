use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::{introspect, schema};
use crate::error::MigrationError;

/// One expected column: its name, and the declaration used when it has to be
/// added to an existing table. Added columns are always nullable or carry a
/// default, so the `ALTER TABLE` form stays legal.
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub decl: &'static str,
}

/// The column set the application code expects a table to have. The live
/// store is introspected against these shapes on every startup; there is no
/// migration-version bookkeeping to go stale.
pub struct TableShape {
    pub table: &'static str,
    pub columns: &'static [ColumnSpec],
}

/// A column whose meaning changed. Its presence in the live table forces a
/// full rebuild; during the copy, `replacement` takes its values whenever the
/// live table does not already carry `replacement` itself.
pub struct RebuildRule {
    pub table: &'static str,
    pub obsolete: &'static str,
    pub replacement: &'static str,
}

const fn col(name: &'static str, decl: &'static str) -> ColumnSpec {
    ColumnSpec { name, decl }
}

/// Expected shape of every table the rest of the application queries.
pub const EXPECTED_TABLES: &[TableShape] = &[
    TableShape {
        table: "settings",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("user_id", "INTEGER NOT NULL DEFAULT 1"),
            col("theme", "TEXT NOT NULL DEFAULT 'light'"),
            col("dark_mode", "INTEGER NOT NULL DEFAULT 0"),
            col("high_contrast", "INTEGER NOT NULL DEFAULT 0"),
            col("home_page", "TEXT NOT NULL DEFAULT 'about:blank'"),
            col("search_engine", "TEXT NOT NULL DEFAULT 'duckduckgo'"),
            col("zoom_percent", "INTEGER NOT NULL DEFAULT 100"),
            col("restore_session", "INTEGER NOT NULL DEFAULT 1"),
        ],
    },
    TableShape {
        table: "profile",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("name", "TEXT NOT NULL DEFAULT ''"),
            col("icon", "TEXT"),
            col("is_default", "INTEGER NOT NULL DEFAULT 0"),
            col("created_at", "TEXT"),
        ],
    },
    TableShape {
        table: "tabs",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("profile_id", "INTEGER NOT NULL DEFAULT 1"),
            col("url", "TEXT NOT NULL DEFAULT ''"),
            col("title", "TEXT"),
            col("position", "INTEGER NOT NULL DEFAULT 0"),
            col("pinned", "INTEGER NOT NULL DEFAULT 0"),
            col("created_at", "TEXT"),
        ],
    },
    TableShape {
        table: "bookmark_folders",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("parent_id", "INTEGER"),
            col("name", "TEXT NOT NULL DEFAULT ''"),
            col("position", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableShape {
        table: "bookmarks",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("folder_id", "INTEGER"),
            col("url", "TEXT NOT NULL DEFAULT ''"),
            col("title", "TEXT"),
            col("position", "INTEGER NOT NULL DEFAULT 0"),
            col("created_at", "TEXT"),
        ],
    },
    TableShape {
        table: "downloads",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("url", "TEXT NOT NULL DEFAULT ''"),
            col("file_path", "TEXT NOT NULL DEFAULT ''"),
            col("status", "TEXT NOT NULL DEFAULT 'in_progress'"),
            col("bytes_total", "INTEGER"),
            col("bytes_done", "INTEGER NOT NULL DEFAULT 0"),
            col("started_at", "TEXT"),
            col("completed_at", "TEXT"),
        ],
    },
    TableShape {
        table: "history",
        columns: &[
            col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            col("url", "TEXT NOT NULL DEFAULT ''"),
            col("title", "TEXT"),
            col("visit_count", "INTEGER NOT NULL DEFAULT 1"),
            col("visited_at", "TEXT"),
        ],
    },
];

/// Tabs used to be keyed by `user_id`; sessions are now per browser profile.
pub const REBUILD_RULES: &[RebuildRule] = &[RebuildRule {
    table: "tabs",
    obsolete: "user_id",
    replacement: "profile_id",
}];

#[derive(Debug, PartialEq, Eq)]
pub enum MigrationDecision {
    NoOp,
    AddColumns(Vec<&'static ColumnSpec>),
    Rebuild,
}

/// Compare the live column set against the expected shape. Purely
/// column-presence driven:
/// - the obsolete column is present -> rebuild (regardless of anything else);
/// - expected columns are missing -> add them in place;
/// - a table with no columns does not exist; creating it is the schema
///   applier's job, not ours.
pub fn decide(
    live: &[String],
    shape: &TableShape,
    rule: Option<&RebuildRule>,
) -> MigrationDecision {
    if live.is_empty() {
        return MigrationDecision::NoOp;
    }
    if let Some(rule) = rule {
        if live.iter().any(|c| c == rule.obsolete) {
            return MigrationDecision::Rebuild;
        }
    }
    let missing: Vec<&'static ColumnSpec> = shape
        .columns
        .iter()
        .filter(|col| !live.iter().any(|l| l == col.name))
        .collect();
    if missing.is_empty() {
        MigrationDecision::NoOp
    } else {
        MigrationDecision::AddColumns(missing)
    }
}

/// Bring every declared table up to its expected shape. Individual failures
/// are logged and skipped; the returned error covers only the inability to
/// talk to the store at all.
pub async fn run(pool: &SqlitePool, script: &str) -> Result<(), MigrationError> {
    for shape in EXPECTED_TABLES {
        let live = {
            let mut conn = pool.acquire().await.map_err(MigrationError::Database)?;
            match introspect::table_columns(&mut conn, shape.table).await {
                Ok(columns) => columns,
                Err(e) => {
                    warn!(table = shape.table, error = %e, "Introspection failed; treating table as absent");
                    Vec::new()
                }
            }
        };
        let rule = REBUILD_RULES.iter().find(|r| r.table == shape.table);
        match decide(&live, shape, rule) {
            MigrationDecision::NoOp => {
                debug!(table = shape.table, "Table already conforms");
            }
            MigrationDecision::AddColumns(missing) => {
                add_columns(pool, shape.table, &missing).await;
            }
            MigrationDecision::Rebuild => {
                if let Some(rule) = rule {
                    match rebuild_table(pool, script, shape, rule, &live).await {
                        Ok(rows) => {
                            info!(table = shape.table, rows, "Table rebuilt");
                        }
                        Err(e) => {
                            warn!(table = shape.table, error = %e, "Rebuild failed; table left unchanged");
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Add each missing column independently; one failure (for instance a
/// duplicate-column race with another process) does not block the rest.
async fn add_columns(pool: &SqlitePool, table: &str, missing: &[&ColumnSpec]) {
    for column in missing {
        let sql = format!(
            "ALTER TABLE {table} ADD COLUMN {} {}",
            column.name, column.decl
        );
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => {
                info!(table, column = column.name, "Added missing column");
            }
            Err(e) => {
                warn!(table, column = column.name, error = %MigrationError::statement(&sql, &e), "Column add failed; continuing");
            }
        }
    }
}

/// Rename/create/copy/drop rebuild, as a single transaction.
///
/// SQLite's DDL is transactional, so a failure in any step rolls the store
/// back to the original table under its original name; the weaker alternative
/// of leaving rows stranded under the temporary name does not arise.
async fn rebuild_table(
    pool: &SqlitePool,
    script: &str,
    shape: &TableShape,
    rule: &RebuildRule,
    live: &[String],
) -> Result<u64, MigrationError> {
    let create_sql = schema::create_statement_for(script, shape.table).ok_or_else(|| {
        MigrationError::ResourceNotFound(format!(
            "schema script has no CREATE statement for '{}'",
            shape.table
        ))
    })?;
    let tmp = format!("{}_old", shape.table);

    let mut dest = Vec::new();
    let mut src = Vec::new();
    for column in shape.columns {
        if live.iter().any(|l| l == column.name) {
            dest.push(column.name);
            src.push(column.name);
        } else if column.name == rule.replacement && live.iter().any(|l| l == rule.obsolete) {
            dest.push(column.name);
            src.push(rule.obsolete);
        }
        // Columns with no source are omitted; the new definition's defaults
        // fill them.
    }

    let mut tx = pool.begin().await?;

    // A crashed earlier rebuild may have left the temporary table behind.
    sqlx::query(&format!("DROP TABLE IF EXISTS {tmp}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("ALTER TABLE {} RENAME TO {tmp}", shape.table))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create_sql).execute(&mut *tx).await?;
    let copy = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {tmp}",
        shape.table,
        dest.join(", "),
        src.join(", ")
    );
    let copied = sqlx::query(&copy).execute(&mut *tx).await?.rows_affected();
    sqlx::query(&format!("DROP TABLE {tmp}"))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn shape(table: &str) -> &'static TableShape {
        EXPECTED_TABLES.iter().find(|s| s.table == table).unwrap()
    }

    fn rule(table: &str) -> Option<&'static RebuildRule> {
        REBUILD_RULES.iter().find(|r| r.table == table)
    }

    #[test]
    fn conforming_table_is_noop() {
        let tabs = shape("tabs");
        let columns: Vec<String> = tabs.columns.iter().map(|c| c.name.to_string()).collect();
        assert_eq!(decide(&columns, tabs, rule("tabs")), MigrationDecision::NoOp);
    }

    #[test]
    fn missing_table_is_left_to_schema_applier() {
        assert_eq!(
            decide(&[], shape("settings"), None),
            MigrationDecision::NoOp
        );
    }

    #[test]
    fn missing_columns_are_added_in_place() {
        let decision = decide(&live(&["id", "user_id", "theme"]), shape("settings"), None);
        match decision {
            MigrationDecision::AddColumns(missing) => {
                let names: Vec<&str> = missing.iter().map(|c| c.name).collect();
                assert!(names.contains(&"high_contrast"));
                assert!(names.contains(&"home_page"));
                assert!(!names.contains(&"theme"));
            }
            other => panic!("expected AddColumns, got {other:?}"),
        }
    }

    #[test]
    fn obsolete_column_forces_rebuild() {
        let decision = decide(
            &live(&["id", "user_id", "url", "title"]),
            shape("tabs"),
            rule("tabs"),
        );
        assert_eq!(decision, MigrationDecision::Rebuild);
    }

    #[test]
    fn absent_obsolete_and_replacement_is_plain_add() {
        let decision = decide(&live(&["id", "url", "title"]), shape("tabs"), rule("tabs"));
        match decision {
            MigrationDecision::AddColumns(missing) => {
                assert!(missing.iter().any(|c| c.name == "profile_id"));
            }
            other => panic!("expected AddColumns, got {other:?}"),
        }
    }

    #[test]
    fn expected_shapes_match_base_schema_script() {
        for shape in EXPECTED_TABLES {
            let stmt = schema::create_statement_for(schema::BASE_SCHEMA, shape.table)
                .unwrap_or_else(|| panic!("no CREATE statement for {}", shape.table));
            let tokens: std::collections::HashSet<&str> = stmt
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .collect();
            for column in shape.columns {
                assert!(
                    tokens.contains(column.name),
                    "{}.{} missing from base schema",
                    shape.table,
                    column.name
                );
            }
        }
    }
}
