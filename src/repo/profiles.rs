use chrono::Utc;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub is_default: bool,
}

pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The default profile, created on first use.
    pub async fn ensure_default(&self) -> anyhow::Result<Profile> {
        if let Some(row) =
            sqlx::query("SELECT id, name, icon, is_default FROM profile WHERE is_default = 1 LIMIT 1")
                .fetch_optional(&self.pool)
                .await?
        {
            return row_to_profile(&row);
        }

        let id = sqlx::query(
            "INSERT INTO profile (name, is_default, created_at) VALUES ('Default', 1, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Profile {
            id,
            name: "Default".to_string(),
            icon: None,
            is_default: true,
        })
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT id, name, icon, is_default FROM profile ORDER BY is_default DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_profile).collect()
    }

    pub async fn create(&self, name: &str) -> anyhow::Result<i64> {
        let id = sqlx::query("INSERT INTO profile (name, is_default, created_at) VALUES (?, 0, ?)")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        icon: row.try_get("icon")?,
        is_default: row.try_get::<i64, _>("is_default")? != 0,
    })
}
