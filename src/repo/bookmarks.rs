use chrono::Utc;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub id: i64,
    pub folder_id: Option<i64>,
    pub url: String,
    pub title: Option<String>,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkFolder {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub position: i64,
}

pub struct BookmarkStore {
    pool: SqlitePool,
}

impl BookmarkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add(
        &self,
        folder_id: Option<i64>,
        url: &str,
        title: Option<&str>,
    ) -> anyhow::Result<i64> {
        let id = sqlx::query(
            "INSERT INTO bookmarks (folder_id, url, title, position, created_at) \
             VALUES (?, ?, ?, \
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM bookmarks \
                      WHERE folder_id IS ?), \
                     ?)",
        )
        .bind(folder_id)
        .bind(url)
        .bind(title)
        .bind(folder_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bookmarks in a folder (`None` for the toolbar root), in position order.
    pub async fn list_in_folder(&self, folder_id: Option<i64>) -> anyhow::Result<Vec<Bookmark>> {
        let rows = sqlx::query(
            "SELECT id, folder_id, url, title, position FROM bookmarks \
             WHERE folder_id IS ? ORDER BY position ASC, id ASC",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;

        let mut bookmarks = Vec::with_capacity(rows.len());
        for row in rows {
            bookmarks.push(Bookmark {
                id: row.try_get("id")?,
                folder_id: row.try_get("folder_id")?,
                url: row.try_get("url")?,
                title: row.try_get("title")?,
                position: row.try_get("position")?,
            });
        }
        Ok(bookmarks)
    }

    pub async fn create_folder(&self, parent_id: Option<i64>, name: &str) -> anyhow::Result<i64> {
        let id = sqlx::query(
            "INSERT INTO bookmark_folders (parent_id, name, position) \
             VALUES (?, ?, \
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM bookmark_folders \
                      WHERE parent_id IS ?))",
        )
        .bind(parent_id)
        .bind(name)
        .bind(parent_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn list_folders(&self) -> anyhow::Result<Vec<BookmarkFolder>> {
        let rows = sqlx::query(
            "SELECT id, parent_id, name, position FROM bookmark_folders \
             ORDER BY parent_id ASC, position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut folders = Vec::with_capacity(rows.len());
        for row in rows {
            folders.push(BookmarkFolder {
                id: row.try_get("id")?,
                parent_id: row.try_get("parent_id")?,
                name: row.try_get("name")?,
                position: row.try_get("position")?,
            });
        }
        Ok(folders)
    }
}
