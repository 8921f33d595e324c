use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// One open tab in a profile's session.
#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub profile_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub position: i64,
    pub pinned: bool,
}

pub struct TabStore {
    pool: SqlitePool,
}

impl TabStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_profile(&self, profile_id: i64) -> anyhow::Result<Vec<Tab>> {
        let rows = sqlx::query(
            "SELECT profile_id, url, title, position, pinned \
             FROM tabs WHERE profile_id = ? ORDER BY position ASC, id ASC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tabs = Vec::with_capacity(rows.len());
        for row in rows {
            tabs.push(Tab {
                profile_id: row.try_get("profile_id")?,
                url: row.try_get("url")?,
                title: row.try_get("title")?,
                position: row.try_get("position")?,
                pinned: row.try_get::<i64, _>("pinned")? != 0,
            });
        }
        Ok(tabs)
    }

    /// Replace the profile's whole session. Tab sessions are saved as a unit
    /// on shutdown; stale rows from the previous session must not linger.
    pub async fn replace_session(&self, profile_id: i64, tabs: &[Tab]) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tabs WHERE profile_id = ?")
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;
        for tab in tabs {
            sqlx::query(
                "INSERT INTO tabs (profile_id, url, title, position, pinned, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(profile_id)
            .bind(&tab.url)
            .bind(&tab.title)
            .bind(tab.position)
            .bind(tab.pinned as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
