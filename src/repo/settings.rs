use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub user_id: i64,
    pub theme: String,
    pub dark_mode: bool,
    pub high_contrast: bool,
    pub home_page: String,
    pub search_engine: String,
    pub zoom_percent: i64,
    pub restore_session: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: 1,
            theme: "light".to_string(),
            dark_mode: false,
            high_contrast: false,
            home_page: "about:blank".to_string(),
            search_engine: "duckduckgo".to_string(),
            zoom_percent: 100,
            restore_session: true,
        }
    }
}

pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Latest settings row for the user, or built-in defaults when none exists
    /// yet. A legacy import may still be in flight shortly after startup, so
    /// "no row yet" is a normal state, not an error.
    pub async fn load(&self, user_id: i64) -> anyhow::Result<Settings> {
        let row = sqlx::query(
            "SELECT user_id, theme, dark_mode, high_contrast, home_page, search_engine, \
                    zoom_percent, restore_session \
             FROM settings WHERE user_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(Settings {
                user_id,
                ..Settings::default()
            });
        };
        Ok(Settings {
            user_id: row.try_get("user_id")?,
            theme: row.try_get("theme")?,
            dark_mode: row.try_get::<i64, _>("dark_mode")? != 0,
            high_contrast: row.try_get::<i64, _>("high_contrast")? != 0,
            home_page: row.try_get("home_page")?,
            search_engine: row.try_get("search_engine")?,
            zoom_percent: row.try_get("zoom_percent")?,
            restore_session: row.try_get::<i64, _>("restore_session")? != 0,
        })
    }

    /// Update the user's settings row in place, creating it when absent.
    pub async fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let existing = sqlx::query("SELECT id FROM settings WHERE user_id = ? ORDER BY id DESC LIMIT 1")
            .bind(settings.user_id)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                sqlx::query(
                    "UPDATE settings SET theme = ?, dark_mode = ?, high_contrast = ?, \
                     home_page = ?, search_engine = ?, zoom_percent = ?, restore_session = ? \
                     WHERE id = ?",
                )
                .bind(&settings.theme)
                .bind(settings.dark_mode as i64)
                .bind(settings.high_contrast as i64)
                .bind(&settings.home_page)
                .bind(&settings.search_engine)
                .bind(settings.zoom_percent)
                .bind(settings.restore_session as i64)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO settings \
                     (user_id, theme, dark_mode, high_contrast, home_page, search_engine, \
                      zoom_percent, restore_session) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(settings.user_id)
                .bind(&settings.theme)
                .bind(settings.dark_mode as i64)
                .bind(settings.high_contrast as i64)
                .bind(&settings.home_page)
                .bind(&settings.search_engine)
                .bind(settings.zoom_percent)
                .bind(settings.restore_session as i64)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SettingsStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        schema::apply_script(&pool, schema::BASE_SCHEMA).await;
        SettingsStore::new(pool)
    }

    #[tokio::test]
    async fn load_without_row_yields_defaults() {
        let store = store().await;
        let settings = store.load(1).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn save_is_update_in_place() {
        let store = store().await;
        let mut settings = Settings::default();
        settings.theme = "dark".to_string();
        settings.dark_mode = true;
        store.save(&settings).await.unwrap();
        settings.home_page = "https://example.com".to_string();
        store.save(&settings).await.unwrap();

        let loaded = store.load(1).await.unwrap();
        assert_eq!(loaded.theme, "dark");
        assert_eq!(loaded.home_page, "https://example.com");

        let count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM settings")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .try_get("c")
            .unwrap();
        assert_eq!(count, 1);
    }
}
