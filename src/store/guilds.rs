//! Guild registry

use super::db::{from_db_id, to_db_id};
use crate::error::NicknameResult;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, UserId};
use sqlx::SqlitePool;

/// What the bot knows about a guild when it registers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
}

/// A registered guild
#[derive(Debug, Clone)]
pub struct GuildRecord {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for guild rows
pub struct GuildRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GuildRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the guild, or refresh its name and owner if it exists
    pub async fn upsert(&self, guild: &GuildInfo) -> NicknameResult<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r"
            INSERT INTO guilds (id, name, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                owner_id = excluded.owner_id,
                updated_at = excluded.updated_at
            WHERE guilds.name != excluded.name OR guilds.owner_id != excluded.owner_id
            ",
        )
        .bind(to_db_id(guild.id.get()))
        .bind(&guild.name)
        .bind(to_db_id(guild.owner_id.get()))
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, guild_id: GuildId) -> NicknameResult<Option<GuildRecord>> {
        let row = sqlx::query_as::<_, (i64, String, i64, i64, i64)>(
            "SELECT id, name, owner_id, created_at, updated_at FROM guilds WHERE id = ?",
        )
        .bind(to_db_id(guild_id.get()))
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, name, owner_id, created_at, updated_at)| GuildRecord {
            id: GuildId::new(from_db_id(id)),
            name,
            owner_id: UserId::new(from_db_id(owner_id)),
            created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
            updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_default(),
        }))
    }

    /// Delete a guild and, through the foreign key, its nicknames
    pub async fn delete(&self, guild_id: GuildId) -> NicknameResult<bool> {
        let result = sqlx::query("DELETE FROM guilds WHERE id = ?")
            .bind(to_db_id(guild_id.get()))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> NicknameResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guilds")
            .fetch_one(self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
