use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub id: i64,
    pub url: String,
    pub file_path: String,
    pub status: String,
    pub bytes_total: Option<i64>,
    pub bytes_done: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct DownloadStore {
    pool: SqlitePool,
}

impl DownloadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin(
        &self,
        url: &str,
        file_path: &str,
        bytes_total: Option<i64>,
    ) -> anyhow::Result<i64> {
        let id = sqlx::query(
            "INSERT INTO downloads (url, file_path, status, bytes_total, bytes_done, started_at) \
             VALUES (?, ?, 'in_progress', ?, 0, ?)",
        )
        .bind(url)
        .bind(file_path)
        .bind(bytes_total)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn update_progress(&self, id: i64, bytes_done: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE downloads SET bytes_done = ? WHERE id = ?")
            .bind(bytes_done)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_finished(&self, id: i64, status: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE downloads SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: i64) -> anyhow::Result<Vec<Download>> {
        let rows = sqlx::query(
            "SELECT id, url, file_path, status, bytes_total, bytes_done, started_at, completed_at \
             FROM downloads ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut downloads = Vec::with_capacity(rows.len());
        for row in rows {
            downloads.push(Download {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                file_path: row.try_get("file_path")?,
                status: row.try_get("status")?,
                bytes_total: row.try_get("bytes_total")?,
                bytes_done: row.try_get("bytes_done")?,
                started_at: parse_timestamp(row.try_get("started_at")?),
                completed_at: parse_timestamp(row.try_get("completed_at")?),
            });
        }
        Ok(downloads)
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
