use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub url: String,
    pub title: Option<String>,
    pub visit_count: i64,
    pub visited_at: Option<DateTime<Utc>>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a visit: bump the existing row for this URL or create one.
    pub async fn record_visit(&self, url: &str, title: Option<&str>) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = sqlx::query(
            "UPDATE history SET visit_count = visit_count + 1, visited_at = ?, \
             title = COALESCE(?, title) WHERE url = ?",
        )
        .bind(&now)
        .bind(title)
        .bind(url)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                "INSERT INTO history (url, title, visit_count, visited_at) VALUES (?, ?, 1, ?)",
            )
            .bind(url)
            .bind(title)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT url, title, visit_count, visited_at FROM history \
             ORDER BY visited_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let visited_at: Option<String> = row.try_get("visited_at")?;
            entries.push(HistoryEntry {
                url: row.try_get("url")?,
                title: row.try_get("title")?,
                visit_count: row.try_get("visit_count")?,
                visited_at: visited_at
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            });
        }
        Ok(entries)
    }

    pub async fn clear(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM history").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
