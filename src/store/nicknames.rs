//! Nickname pool rows
//!
//! Removal is a soft delete: the row is marked inactive and kept as history.

use super::db::{from_db_id, to_db_id};
use crate::error::{NicknameError, NicknameResult};
use crate::nickname::match_key;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, UserId};
use sqlx::SqlitePool;

/// A nickname in a guild's pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicknameRecord {
    pub id: i64,
    pub guild_id: GuildId,
    pub nickname: String,
    pub is_active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

type NicknameRow = (i64, i64, String, bool, i64, i64);

impl From<NicknameRow> for NicknameRecord {
    fn from((id, guild_id, nickname, is_active, created_by, created_at): NicknameRow) -> Self {
        Self {
            id,
            guild_id: GuildId::new(from_db_id(guild_id)),
            nickname,
            is_active,
            created_by: UserId::new(from_db_id(created_by)),
            created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        }
    }
}

/// Repository for nickname rows
pub struct NicknameRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NicknameRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an active nickname
    ///
    /// The guild row must already exist. `nickname` is expected to be normalized.
    pub async fn insert(
        &self,
        guild_id: GuildId,
        nickname: &str,
        created_by: UserId,
    ) -> NicknameResult<NicknameRecord> {
        if self.find_active(guild_id, nickname).await?.is_some() {
            return Err(NicknameError::DuplicateNickname(nickname.to_string()));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO nicknames (guild_id, nickname, nickname_key, is_active, created_by, created_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .bind(nickname)
        .bind(match_key(nickname))
        .bind(to_db_id(created_by.get()))
        .bind(now.timestamp())
        .execute(self.pool)
        .await;

        // The partial unique index catches a concurrent insert of the same name
        let result = match result {
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(NicknameError::DuplicateNickname(nickname.to_string()));
            }
            other => other?,
        };

        Ok(NicknameRecord {
            id: result.last_insert_rowid(),
            guild_id,
            nickname: nickname.to_string(),
            is_active: true,
            created_by,
            created_at: DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now),
        })
    }

    /// Case-insensitive lookup among active nicknames, by folded key
    pub async fn find_active(
        &self,
        guild_id: GuildId,
        nickname: &str,
    ) -> NicknameResult<Option<NicknameRecord>> {
        let row = sqlx::query_as::<_, NicknameRow>(
            r"
            SELECT id, guild_id, nickname, is_active, created_by, created_at
            FROM nicknames
            WHERE guild_id = ? AND nickname_key = ? AND is_active = 1
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .bind(match_key(nickname))
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(NicknameRecord::from))
    }

    /// Mark an active nickname inactive, returning the stored text
    pub async fn deactivate(&self, guild_id: GuildId, nickname: &str) -> NicknameResult<String> {
        let removed = sqlx::query_scalar::<_, String>(
            r"
            UPDATE nicknames SET is_active = 0
            WHERE guild_id = ? AND nickname_key = ? AND is_active = 1
            RETURNING nickname
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .bind(match_key(nickname))
        .fetch_optional(self.pool)
        .await?;

        removed.ok_or_else(|| NicknameError::NotFound(format!("Nickname **{nickname}**")))
    }

    /// Active nicknames, oldest first
    pub async fn list_active(&self, guild_id: GuildId) -> NicknameResult<Vec<NicknameRecord>> {
        let rows = sqlx::query_as::<_, NicknameRow>(
            r"
            SELECT id, guild_id, nickname, is_active, created_by, created_at
            FROM nicknames
            WHERE guild_id = ? AND is_active = 1
            ORDER BY created_at, id
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(NicknameRecord::from).collect())
    }

    /// One active nickname chosen by the database, if any
    pub async fn random_active(&self, guild_id: GuildId) -> NicknameResult<Option<String>> {
        let nickname = sqlx::query_scalar::<_, String>(
            r"
            SELECT nickname FROM nicknames
            WHERE guild_id = ? AND is_active = 1
            ORDER BY RANDOM()
            LIMIT 1
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .fetch_optional(self.pool)
        .await?;
        Ok(nickname)
    }

    pub async fn count_active(&self, guild_id: GuildId) -> NicknameResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM nicknames WHERE guild_id = ? AND is_active = 1")
                .bind(to_db_id(guild_id.get()))
                .fetch_one(self.pool)
                .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// All rows for a guild including inactive history
    pub async fn history(&self, guild_id: GuildId) -> NicknameResult<Vec<NicknameRecord>> {
        let rows = sqlx::query_as::<_, NicknameRow>(
            r"
            SELECT id, guild_id, nickname, is_active, created_by, created_at
            FROM nicknames
            WHERE guild_id = ?
            ORDER BY created_at, id
            ",
        )
        .bind(to_db_id(guild_id.get()))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(NicknameRecord::from).collect())
    }
}
