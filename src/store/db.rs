//! Database connection and schema
//!
//! Async SQLite access through SQLx. The two tables are created on startup if
//! they do not exist yet.

use super::{GuildRepository, NicknameRepository};
use crate::error::NicknameResult;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS guilds (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS nicknames (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id INTEGER NOT NULL REFERENCES guilds (id) ON DELETE CASCADE,
        nickname TEXT NOT NULL,
        nickname_key TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_by INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_nicknames_guild_active ON nicknames (guild_id, is_active)",
    // Active names are unique per guild by folded key; inactive rows are history
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_nicknames_active_key
    ON nicknames (guild_id, nickname_key)
    WHERE is_active = 1
    ",
];

/// Database handle with connection pool
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connect to the database at `url` and create missing tables
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if the URL is invalid, the connection
    /// fails or the schema cannot be created.
    pub async fn connect(url: &str) -> NicknameResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        info!(url = %redact(url), "Database connected");
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create missing tables
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> NicknameResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("Database schema checked");
        Ok(Self { pool })
    }

    /// Round trip to check connectivity
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if the query fails.
    pub async fn ping(&self) -> NicknameResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn guilds(&self) -> GuildRepository<'_> {
        GuildRepository::new(&self.pool)
    }

    #[must_use]
    pub fn nicknames(&self) -> NicknameRepository<'_> {
        NicknameRepository::new(&self.pool)
    }
}

/// Strip credentials from a connection string before logging it
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Snowflakes fit in 63 bits, so the round trip through SQLite's signed integers is lossless
#[allow(clippy::cast_possible_wrap)]
pub(crate) const fn to_db_id(id: u64) -> i64 {
    id as i64
}

#[allow(clippy::cast_sign_loss)]
pub(crate) const fn from_db_id(id: i64) -> u64 {
    id as u64
}
