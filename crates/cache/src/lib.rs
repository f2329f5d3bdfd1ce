use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};
use tracing::warn;

use shared::protocol::{Session, Settings, UserAccount};

/// Fixed keys mirrored by the façade. All of them are cleared together on
/// sign-out.
pub mod keys {
    pub const SESSION: &str = "track_v_session";
    pub const USER: &str = "track_v_user";
    pub const SETTINGS: &str = "track_v_settings";
    /// Plain-string mirror of the dark-mode setting for consumers that
    /// cannot parse the structured settings entry.
    pub const DARK_MODE_FLAG: &str = "darkMode";
}

const DARK_MODE_ENABLED: &str = "enabled";
const DARK_MODE_DISABLED: &str = "disabled";

/// Tagged record stored per key. Reads validate the tag against the key
/// they were issued for and fail closed (entry treated as absent) on any
/// mismatch or decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
enum CacheEntry {
    Session(Session),
    User(UserAccount),
    Settings(Settings),
}

/// Local persistent key-value cache backed by SQLite.
#[derive(Clone)]
pub struct Cache {
    pool: Pool<Sqlite>,
}

impl Cache {
    pub async fn open(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let cache = Self { pool };
        cache.ensure_entries_table().await?;
        Ok(cache)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_entries_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure kv_entries table exists")?;
        Ok(())
    }

    pub async fn put_session(&self, session: &Session) -> Result<()> {
        self.write_entry(keys::SESSION, &CacheEntry::Session(session.clone()))
            .await
    }

    pub async fn session(&self) -> Result<Option<Session>> {
        Ok(match self.read_entry(keys::SESSION).await? {
            Some(CacheEntry::Session(session)) => Some(session),
            _ => None,
        })
    }

    pub async fn put_user(&self, user: &UserAccount) -> Result<()> {
        self.write_entry(keys::USER, &CacheEntry::User(user.clone()))
            .await
    }

    pub async fn user(&self) -> Result<Option<UserAccount>> {
        Ok(match self.read_entry(keys::USER).await? {
            Some(CacheEntry::User(user)) => Some(user),
            _ => None,
        })
    }

    pub async fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.write_entry(keys::SETTINGS, &CacheEntry::Settings(*settings))
            .await
    }

    pub async fn settings(&self) -> Result<Option<Settings>> {
        Ok(match self.read_entry(keys::SETTINGS).await? {
            Some(CacheEntry::Settings(settings)) => Some(settings),
            _ => None,
        })
    }

    pub async fn set_dark_mode_flag(&self, enabled: bool) -> Result<()> {
        let value = if enabled {
            DARK_MODE_ENABLED
        } else {
            DARK_MODE_DISABLED
        };
        self.write_raw(keys::DARK_MODE_FLAG, value).await
    }

    pub async fn dark_mode_flag(&self) -> Result<Option<bool>> {
        Ok(match self.read_raw(keys::DARK_MODE_FLAG).await?.as_deref() {
            Some(DARK_MODE_ENABLED) => Some(true),
            Some(DARK_MODE_DISABLED) => Some(false),
            _ => None,
        })
    }

    /// Removes session, user, settings, and the dark-mode flag in a single
    /// statement. Cached identity must never outlive a sign-out.
    pub async fn clear_auth_state(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key IN (?1, ?2, ?3, ?4)")
            .bind(keys::SESSION)
            .bind(keys::USER)
            .bind(keys::SETTINGS)
            .bind(keys::DARK_MODE_FLAG)
            .execute(&self.pool)
            .await
            .context("failed to clear cached auth state")?;
        Ok(())
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let value =
            serde_json::to_string(entry).with_context(|| format!("failed to encode entry {key}"))?;
        self.write_raw(key, &value).await
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(raw) = self.read_raw(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(key, "dropping cache entry with unreadable schema: {err}");
                Ok(None)
            }
        }
    }

    async fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write cache entry {key}"))?;
        Ok(())
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read cache entry {key}"))?;
        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for cache url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
