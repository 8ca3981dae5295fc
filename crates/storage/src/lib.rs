use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use shared::domain::ChatSession;

const IDENTITY_KEY: &str = "identity";
const SESSION_KEY: &str = "session";

/// Durable per-profile key-value store.
///
/// Holds exactly two logical entries: the chosen display name and the cached
/// session descriptor. Both survive restarts until explicitly cleared; logout
/// clears them together.
#[derive(Clone)]
pub struct ProfileStore {
    pool: Pool<Sqlite>,
}

impl ProfileStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to ensure profile_kv table exists")?;

        Ok(Self { pool })
    }

    pub fn sqlite_url_for_data_dir(base_dir: &Path) -> String {
        sqlite_url_from_path(&base_dir.join("profile.sqlite3"))
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn load_identity(&self) -> Result<Option<String>> {
        self.get(IDENTITY_KEY).await
    }

    /// Persists the display name verbatim. Callers are expected to have run
    /// `client_core::validate_display_name` first; the store itself does not
    /// re-validate.
    pub async fn store_identity(&self, name: &str) -> Result<()> {
        self.put(IDENTITY_KEY, name).await
    }

    pub async fn clear_identity(&self) -> Result<()> {
        self.delete(IDENTITY_KEY).await
    }

    pub async fn load_session(&self) -> Result<Option<ChatSession>> {
        let Some(raw) = self.get(SESSION_KEY).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt cached session payload: {raw}"))?;
        Ok(Some(session))
    }

    /// Replaces the cached session wholesale.
    pub async fn store_session(&self, session: &ChatSession) -> Result<()> {
        let raw = serde_json::to_string(session).context("failed to serialize session")?;
        self.put(SESSION_KEY, &raw).await
    }

    pub async fn clear_session(&self) -> Result<()> {
        self.delete(SESSION_KEY).await
    }

    /// Logout semantics: identity and session are dropped together.
    pub async fn clear_profile(&self) -> Result<()> {
        self.clear_identity().await?;
        self.clear_session().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM profile_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<String, _>(0)))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO profile_kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM profile_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn sqlite_url_from_path(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
