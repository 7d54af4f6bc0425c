use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

/// Local persistence for per-site preferences and the user id
#[derive(Clone)]
pub struct PreferenceStore {
    pool: SqlitePool,
}

impl PreferenceStore {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            if let Some(dir) = db_url
                .strip_prefix("sqlite:")
                .and_then(|path| Path::new(path).parent())
                .filter(|dir| !dir.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(dir).await?;
            }
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url).await?;
        Self::migrate(pool).await
    }

    /// Throwaway store living for the lifetime of the pool
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    pub async fn is_site_disabled(&self, domain: &str) -> Result<bool> {
        let row = sqlx::query("SELECT disabled FROM site_preferences WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some_and(|row| row.get::<bool, _>("disabled")))
    }

    pub async fn set_site_disabled(&self, domain: &str, disabled: bool) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO site_preferences (domain, disabled, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(domain) DO UPDATE
            SET disabled = excluded.disabled, updated_at = excluded.updated_at
            ",
        )
        .bind(domain)
        .bind(disabled)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every domain with a stored preference
    pub async fn site_preferences(&self) -> Result<BTreeMap<String, bool>> {
        let rows = sqlx::query("SELECT domain, disabled FROM site_preferences")
            .fetch_all(&self.pool)
            .await?;

        let preferences = rows
            .into_iter()
            .map(|row| (row.get::<String, _>("domain"), row.get::<bool, _>("disabled")))
            .collect();

        Ok(preferences)
    }

    pub async fn user_id(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT user_id FROM identity WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("user_id")))
    }

    pub async fn save_user_id(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO identity (id, user_id, created_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id
            ",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_sites_are_enabled() {
        let store = PreferenceStore::in_memory().await.unwrap();
        assert!(!store.is_site_disabled("shop.example").await.unwrap());
    }

    #[tokio::test]
    async fn last_write_wins_per_domain() {
        let store = PreferenceStore::in_memory().await.unwrap();
        store.set_site_disabled("shop.example", true).await.unwrap();
        store.set_site_disabled("other.example", true).await.unwrap();
        store.set_site_disabled("shop.example", false).await.unwrap();

        assert!(!store.is_site_disabled("shop.example").await.unwrap());
        assert!(store.is_site_disabled("other.example").await.unwrap());
        assert_eq!(store.site_preferences().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn user_id_round_trips() {
        let store = PreferenceStore::in_memory().await.unwrap();
        assert_eq!(store.user_id().await.unwrap(), None);

        store.save_user_id("abc-123").await.unwrap();
        assert_eq!(store.user_id().await.unwrap().as_deref(), Some("abc-123"));
    }
}
