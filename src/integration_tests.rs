//! End-to-end migration tests against real store files on disk.

use std::path::Path;
use std::time::{Duration, Instant};

use sqlx::{Connection, Row, SqliteConnection, SqlitePool};

use crate::config::StoreConfig;
use crate::db::{introspect, legacy, migrate};
use crate::repo::tabs::Tab;
use crate::startup::store::{self, init_store, ImportStatus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn config_in(dir: &Path) -> StoreConfig {
    StoreConfig {
        db_path: Some(dir.join("store.db").display().to_string()),
        legacy_db_path: dir.join("legacy-store.db").display().to_string(),
        import_timeout_secs: 10,
        schema_path: None,
    }
}

async fn raw_conn(path: &Path) -> SqliteConnection {
    SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .unwrap()
}

async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
    let mut conn = pool.acquire().await.unwrap();
    introspect::table_columns(&mut conn, table).await.unwrap()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS c FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
        .try_get("c")
        .unwrap()
}

#[tokio::test]
async fn fresh_store_has_every_expected_table() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let bundle = init_store(&config_in(dir.path())).await.unwrap();

    for shape in migrate::EXPECTED_TABLES {
        let live = columns(&bundle.pool, shape.table).await;
        for column in shape.columns {
            assert!(
                live.iter().any(|l| l == column.name),
                "{}.{} missing after bootstrap",
                shape.table,
                column.name
            );
        }
    }

    // No legacy file in the working set: the import must skip, not fail.
    let status = bundle.legacy_import.wait().await;
    assert!(matches!(status, ImportStatus::Skipped { .. }), "{status:?}");
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let bundle = init_store(&config).await.unwrap();
    let mut first = Vec::new();
    for shape in migrate::EXPECTED_TABLES {
        first.push(columns(&bundle.pool, shape.table).await);
    }
    bundle.legacy_import.wait().await;
    bundle.pool.close().await;

    let bundle = init_store(&config).await.unwrap();
    for (shape, before) in migrate::EXPECTED_TABLES.iter().zip(first) {
        let after = columns(&bundle.pool, shape.table).await;
        assert_eq!(before, after, "column set drifted for {}", shape.table);
    }
}

#[tokio::test]
async fn additive_migration_fills_out_old_settings_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let db_path = config.resolve_db_path().unwrap();

    {
        let mut conn = raw_conn(&db_path).await;
        sqlx::query(
            "CREATE TABLE settings (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             user_id INTEGER, theme TEXT)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query("INSERT INTO settings (user_id, theme) VALUES (1, 'purple')")
            .execute(&mut conn)
            .await
            .unwrap();
    }

    let bundle = init_store(&config).await.unwrap();

    let live = columns(&bundle.pool, "settings").await;
    for name in ["high_contrast", "home_page", "search_engine", "zoom_percent"] {
        assert!(live.iter().any(|l| l == name), "{name} not added");
    }
    assert_eq!(count(&bundle.pool, "settings").await, 1);

    let row = sqlx::query("SELECT theme, high_contrast FROM settings")
        .fetch_one(&bundle.pool)
        .await
        .unwrap();
    assert_eq!(row.try_get::<String, _>("theme").unwrap(), "purple");
    assert_eq!(row.try_get::<i64, _>("high_contrast").unwrap(), 0);
}

#[tokio::test]
async fn tabs_rebuild_moves_user_id_into_profile_id() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let db_path = config.resolve_db_path().unwrap();

    {
        let mut conn = raw_conn(&db_path).await;
        sqlx::query(
            "CREATE TABLE tabs (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             user_id INTEGER, url TEXT, title TEXT)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        for (user_id, url) in [(1, "https://a.example"), (2, "https://b.example"), (7, "https://c.example")] {
            sqlx::query("INSERT INTO tabs (user_id, url, title) VALUES (?, ?, 'kept')")
                .bind(user_id)
                .bind(url)
                .execute(&mut conn)
                .await
                .unwrap();
        }
    }

    let bundle = init_store(&config).await.unwrap();

    let live = columns(&bundle.pool, "tabs").await;
    assert!(live.iter().any(|l| l == "profile_id"));
    assert!(!live.iter().any(|l| l == "user_id"));
    assert_eq!(count(&bundle.pool, "tabs").await, 3);

    let rows = sqlx::query("SELECT profile_id, url, title FROM tabs ORDER BY id ASC")
        .fetch_all(&bundle.pool)
        .await
        .unwrap();
    let profiles: Vec<i64> = rows
        .iter()
        .map(|r| r.try_get("profile_id").unwrap())
        .collect();
    assert_eq!(profiles, vec![1, 2, 7]);
    for row in &rows {
        assert_eq!(row.try_get::<String, _>("title").unwrap(), "kept");
    }
    assert_eq!(
        rows[0].try_get::<String, _>("url").unwrap(),
        "https://a.example"
    );
}

async fn write_legacy_fixture(path: &Path) {
    let mut conn = raw_conn(path).await;
    sqlx::query(
        "CREATE TABLE settings (id INTEGER PRIMARY KEY AUTOINCREMENT, \
         user_id INTEGER, theme TEXT, dark_mode INTEGER)",
    )
    .execute(&mut conn)
    .await
    .unwrap();
    for (id, user_id, theme, dark_mode) in [
        (1, 1, "main", 0),
        (2, 2, "solar", 1),
        (3, 1, "Dark Mode", 0),
    ] {
        sqlx::query("INSERT INTO settings (id, user_id, theme, dark_mode) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(user_id)
            .bind(theme)
            .bind(dark_mode)
            .execute(&mut conn)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn legacy_import_copies_and_normalizes_one_row() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_legacy_fixture(&config.legacy_db_path()).await;

    let bundle = init_store(&config).await.unwrap();
    let status = bundle.legacy_import.wait().await;
    assert_eq!(status, ImportStatus::Completed { rows: 1 });

    assert_eq!(count(&bundle.pool, "settings").await, 1);
    let row = sqlx::query(
        "SELECT id, user_id, theme, dark_mode, high_contrast, home_page FROM settings",
    )
    .fetch_one(&bundle.pool)
    .await
    .unwrap();
    // Latest row in the default user scope: id 3, not the other user's newer
    // row and not the older id 1.
    assert_eq!(row.try_get::<i64, _>("id").unwrap(), 3);
    assert_eq!(row.try_get::<i64, _>("user_id").unwrap(), 1);
    assert_eq!(row.try_get::<String, _>("theme").unwrap(), "dark");
    assert_eq!(row.try_get::<i64, _>("dark_mode").unwrap(), 1);
    // The legacy store carried no high-contrast signal, so the column keeps
    // its declared default.
    assert_eq!(row.try_get::<i64, _>("high_contrast").unwrap(), 0);
    // Column missing from the legacy store resolves to the live default.
    assert_eq!(
        row.try_get::<String, _>("home_page").unwrap(),
        "about:blank"
    );

    let settings = bundle.settings.load(1).await.unwrap();
    assert_eq!(settings.theme, "dark");
    assert!(settings.dark_mode);
}

#[tokio::test]
async fn rerunning_import_replaces_rather_than_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_legacy_fixture(&config.legacy_db_path()).await;

    let bundle = init_store(&config).await.unwrap();
    assert_eq!(
        bundle.legacy_import.wait().await,
        ImportStatus::Completed { rows: 1 }
    );
    bundle.pool.close().await;

    let bundle = init_store(&config).await.unwrap();
    assert_eq!(
        bundle.legacy_import.wait().await,
        ImportStatus::Completed { rows: 1 }
    );
    assert_eq!(count(&bundle.pool, "settings").await, 1);
    let theme: String = sqlx::query("SELECT theme FROM settings")
        .fetch_one(&bundle.pool)
        .await
        .unwrap()
        .try_get("theme")
        .unwrap();
    assert_eq!(theme, "dark");
}

#[tokio::test]
async fn oversized_legacy_store_is_never_attached() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let file = std::fs::File::create(config.legacy_db_path()).unwrap();
    file.set_len(legacy::MAX_LEGACY_DB_BYTES + 1).unwrap();

    let bundle = init_store(&config).await.unwrap();
    let status = bundle.legacy_import.wait().await;
    match status {
        ImportStatus::Skipped { reason } => assert!(reason.contains("bytes"), "{reason}"),
        other => panic!("expected Skipped, got {other:?}"),
    }
    assert_eq!(count(&bundle.pool, "settings").await, 0);
}

#[tokio::test]
async fn importing_the_live_store_into_itself_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.legacy_db_path = config.db_path.clone().unwrap();

    let bundle = init_store(&config).await.unwrap();
    let status = bundle.legacy_import.wait().await;
    match status {
        ImportStatus::Skipped { reason } => assert!(reason.contains("live"), "{reason}"),
        other => panic!("expected Skipped, got {other:?}"),
    }
}

#[tokio::test]
async fn import_supervisor_cancels_a_stuck_worker() {
    let worker = tokio::spawn(std::future::pending::<Result<u64, crate::MigrationError>>());
    let started = Instant::now();
    let status = store::supervise(worker, Duration::from_millis(100)).await;
    assert_eq!(status, ImportStatus::TimedOut);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "supervisor blocked well past its budget"
    );
}

#[tokio::test]
async fn repositories_work_against_the_migrated_store() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = init_store(&config_in(dir.path())).await.unwrap();

    let profile = bundle.profiles.ensure_default().await.unwrap();
    assert!(profile.is_default);
    // Second call finds the same row instead of minting another default.
    assert_eq!(bundle.profiles.ensure_default().await.unwrap().id, profile.id);

    let session = vec![
        Tab {
            profile_id: profile.id,
            url: "https://example.com".to_string(),
            title: Some("Example".to_string()),
            position: 0,
            pinned: true,
        },
        Tab {
            profile_id: profile.id,
            url: "https://docs.example.com".to_string(),
            title: None,
            position: 1,
            pinned: false,
        },
    ];
    bundle.tabs.replace_session(profile.id, &session).await.unwrap();
    bundle.tabs.replace_session(profile.id, &session).await.unwrap();
    let listed = bundle.tabs.list_for_profile(profile.id).await.unwrap();
    assert_eq!(listed, session);

    let folder = bundle.bookmarks.create_folder(None, "Reading").await.unwrap();
    bundle
        .bookmarks
        .add(Some(folder), "https://blog.example.com", Some("Blog"))
        .await
        .unwrap();
    assert_eq!(
        bundle.bookmarks.list_in_folder(Some(folder)).await.unwrap().len(),
        1
    );

    let id = bundle
        .downloads
        .begin("https://example.com/file.tar.gz", "/tmp/file.tar.gz", Some(1024))
        .await
        .unwrap();
    bundle.downloads.update_progress(id, 1024).await.unwrap();
    bundle.downloads.mark_finished(id, "done").await.unwrap();
    let recent = bundle.downloads.list_recent(5).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, "done");
    assert!(recent[0].completed_at.is_some());
}
