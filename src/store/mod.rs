//! Nickname pool store
//!
//! Persistent per-guild nickname pools backed by SQLite through SQLx:
//! - Guild registry, auto-created on first interaction
//! - Nickname rows with soft delete
//!
//! When no database is reachable, random picks fall back to an in-memory
//! default pool so renaming keeps working.

mod db;
mod guilds;
mod nicknames;

pub use db::Database;
pub use guilds::{GuildInfo, GuildRecord, GuildRepository};
pub use nicknames::{NicknameRecord, NicknameRepository};

use crate::error::{NicknameError, NicknameResult};
use crate::nickname;
use poise::serenity_prelude::{GuildId, UserId};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{error, warn};

/// Connectivity of the backing database
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum DatabaseState {
    #[display("Connected")]
    Connected,
    #[display("Degraded")]
    Degraded,
    #[display("Not configured")]
    NotConfigured,
}

/// Snapshot of the store for a health report
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub state: DatabaseState,
    /// Active nicknames in the requested guild, if the database answered
    pub nicknames: Option<usize>,
    /// Registered guilds, if the database answered
    pub guilds: Option<usize>,
    pub fallback_size: usize,
}

/// Nickname pools with an in-memory fallback
#[derive(Clone, Debug)]
pub struct PoolStore {
    db: Option<Database>,
    fallback: Arc<Vec<String>>,
}

impl PoolStore {
    #[must_use]
    pub fn new(db: Option<Database>, fallback: Vec<String>) -> Self {
        Self {
            db,
            fallback: Arc::new(fallback),
        }
    }

    /// Store that only serves the fallback pool
    #[must_use]
    pub fn fallback_only(fallback: Vec<String>) -> Self {
        Self::new(None, fallback)
    }

    /// The database, or `DatabaseUnavailable` if none is configured
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` when running without a database.
    pub fn database(&self) -> NicknameResult<&Database> {
        self.db.as_ref().ok_or_else(|| {
            NicknameError::DatabaseUnavailable("no database configured".to_string())
        })
    }

    #[must_use]
    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    /// Register a guild or refresh its name and owner
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if there is no database or the query fails.
    pub async fn ensure_guild(&self, guild: &GuildInfo) -> NicknameResult<()> {
        self.database()?.guilds().upsert(guild).await
    }

    /// Forget a guild the bot was removed from, along with its pool
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if there is no database or the query fails.
    pub async fn remove_guild(&self, guild_id: GuildId) -> NicknameResult<bool> {
        self.database()?.guilds().delete(guild_id).await
    }

    /// Add a nickname to a guild's pool
    ///
    /// # Errors
    ///
    /// - `InvalidNickname` if the text is empty or too long
    /// - `DuplicateNickname` if an active entry already matches
    /// - `DatabaseUnavailable` if there is no database or a query fails
    pub async fn add(
        &self,
        guild: &GuildInfo,
        text: &str,
        creator: UserId,
    ) -> NicknameResult<NicknameRecord> {
        let cleaned = nickname::normalize(text)?;
        let db = self.database()?;
        db.guilds().upsert(guild).await?;
        db.nicknames().insert(guild.id, &cleaned, creator).await
    }

    /// Soft delete an active nickname
    ///
    /// # Errors
    ///
    /// - `NotFound` if no active entry matches
    /// - `DatabaseUnavailable` if there is no database or the query fails
    pub async fn remove(&self, guild_id: GuildId, text: &str) -> NicknameResult<String> {
        self.database()?
            .nicknames()
            .deactivate(guild_id, text.trim())
            .await
    }

    /// Active nicknames ordered by creation time
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if there is no database or the query fails.
    pub async fn list(&self, guild_id: GuildId) -> NicknameResult<Vec<NicknameRecord>> {
        self.database()?.nicknames().list_active(guild_id).await
    }

    /// Active nicknames containing `term`, ignoring case
    ///
    /// # Errors
    ///
    /// Returns `DatabaseUnavailable` if there is no database or the query fails.
    pub async fn find(&self, guild_id: GuildId, term: &str) -> NicknameResult<Vec<NicknameRecord>> {
        let needle = nickname::match_key(term);
        let matches = self
            .list(guild_id)
            .await?
            .into_iter()
            .filter(|record| nickname::match_key(&record.nickname).contains(&needle))
            .collect();
        Ok(matches)
    }

    /// One active nickname from the guild's pool
    ///
    /// Falls back to the default pool if the database is missing or failing.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPool` if the guild has no active nicknames, or if the
    /// fallback is needed and empty.
    pub async fn pick_random(&self, guild_id: GuildId) -> NicknameResult<String> {
        if let Some(db) = &self.db {
            match db.nicknames().random_active(guild_id).await {
                Ok(Some(nickname)) => return Ok(nickname),
                Ok(None) => return Err(NicknameError::EmptyPool),
                Err(e) => {
                    error!(
                        guild_id = %guild_id,
                        error = %e,
                        "Nickname query failed, using fallback pool"
                    );
                }
            }
        } else {
            warn!(guild_id = %guild_id, "No database configured, using fallback pool");
        }
        self.pick_fallback()
    }

    fn pick_fallback(&self) -> NicknameResult<String> {
        self.fallback
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(NicknameError::EmptyPool)
    }

    /// Connectivity and counts for the health command
    pub async fn health(&self, guild_id: GuildId) -> StoreHealth {
        let fallback_size = self.fallback.len();
        let Some(db) = &self.db else {
            return StoreHealth {
                state: DatabaseState::NotConfigured,
                nicknames: None,
                guilds: None,
                fallback_size,
            };
        };

        if let Err(e) = db.ping().await {
            warn!(error = %e, "Database ping failed");
            return StoreHealth {
                state: DatabaseState::Degraded,
                nicknames: None,
                guilds: None,
                fallback_size,
            };
        }

        let nicknames = db.nicknames().count_active(guild_id).await.ok();
        let guilds = db.guilds().count().await.ok();
        let state = if nicknames.is_some() && guilds.is_some() {
            DatabaseState::Connected
        } else {
            DatabaseState::Degraded
        };

        StoreHealth {
            state,
            nicknames,
            guilds,
            fallback_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(500);
    const OWNER: UserId = UserId::new(77);

    fn guild_info() -> GuildInfo {
        GuildInfo {
            id: GUILD,
            name: "Test Server".to_string(),
            owner_id: OWNER,
        }
    }

    async fn store() -> PoolStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        PoolStore::new(Some(db), vec!["Fallback".to_string()])
    }

    fn names(records: &[NicknameRecord]) -> Vec<&str> {
        records.iter().map(|r| r.nickname.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_creates_guild_row() {
        let store = store().await;
        let record = store.add(&guild_info(), "  Baron ", OWNER).await.unwrap();
        assert_eq!(record.nickname, "Baron");
        assert!(record.is_active);
        assert_eq!(record.created_by, OWNER);

        let guild = store.database().unwrap().guilds().find(GUILD).await.unwrap();
        assert_eq!(guild.unwrap().name, "Test Server");
    }

    #[tokio::test]
    async fn test_add_rejects_empty() {
        let store = store().await;
        let result = store.add(&guild_info(), "   ", OWNER).await;
        assert!(matches!(result, Err(NicknameError::InvalidNickname(_))));
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_active() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();

        let result = store.add(&guild_info(), "baron", OWNER).await;
        assert!(matches!(result, Err(NicknameError::DuplicateNickname(_))));
        assert_eq!(store.list(GUILD).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_fold_non_ascii_case() {
        let store = store().await;
        store.add(&guild_info(), "Élan", OWNER).await.unwrap();

        let result = store.add(&guild_info(), "élan", OWNER).await;
        assert!(matches!(result, Err(NicknameError::DuplicateNickname(_))));
        assert_eq!(store.find(GUILD, "élan").await.unwrap().len(), 1);

        assert_eq!(store.remove(GUILD, "ÉLAN").await.unwrap(), "Élan");
        assert!(store.list(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let store = store().await;
        let result = store.remove(GUILD, "Ghost").await;
        assert!(matches!(result, Err(NicknameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_soft_deletes() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        store.add(&guild_info(), "Operator", OWNER).await.unwrap();

        assert_eq!(store.remove(GUILD, " BARON ").await.unwrap(), "Baron");
        assert_eq!(names(&store.list(GUILD).await.unwrap()), vec!["Operator"]);

        // Removing twice fails, but the row survives as history
        assert!(matches!(
            store.remove(GUILD, "Baron").await,
            Err(NicknameError::NotFound(_))
        ));
        let history = store
            .database()
            .unwrap()
            .nicknames()
            .history(GUILD)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_active);
    }

    #[tokio::test]
    async fn test_readd_after_remove() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        store.remove(GUILD, "Baron").await.unwrap();
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        assert_eq!(names(&store.list(GUILD).await.unwrap()), vec!["Baron"]);
    }

    #[tokio::test]
    async fn test_list_ordered_by_creation() {
        let store = store().await;
        for name in ["Zulu", "Alpha", "Mike"] {
            store.add(&guild_info(), name, OWNER).await.unwrap();
        }
        assert_eq!(
            names(&store.list(GUILD).await.unwrap()),
            vec!["Zulu", "Alpha", "Mike"]
        );
    }

    #[tokio::test]
    async fn test_pools_are_per_guild() {
        let store = store().await;
        let other = GuildInfo {
            id: GuildId::new(501),
            name: "Other".to_string(),
            owner_id: OWNER,
        };
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        store.add(&other, "Baron", OWNER).await.unwrap();
        store.add(&other, "Operator", OWNER).await.unwrap();

        assert_eq!(store.list(GUILD).await.unwrap().len(), 1);
        assert_eq!(store.list(other.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pick_random_empty_pool() {
        let store = store().await;
        let result = store.pick_random(GUILD).await;
        assert!(matches!(result, Err(NicknameError::EmptyPool)));
    }

    #[tokio::test]
    async fn test_pick_random_never_returns_inactive() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        store.add(&guild_info(), "Operator", OWNER).await.unwrap();
        store.remove(GUILD, "Baron").await.unwrap();

        for _ in 0..25 {
            assert_eq!(store.pick_random(GUILD).await.unwrap(), "Operator");
        }

        store.remove(GUILD, "Operator").await.unwrap();
        assert!(matches!(
            store.pick_random(GUILD).await,
            Err(NicknameError::EmptyPool)
        ));
    }

    #[tokio::test]
    async fn test_find_is_case_insensitive_substring() {
        let store = store().await;
        for name in ["Operator", "Co-Op", "Baron"] {
            store.add(&guild_info(), name, OWNER).await.unwrap();
        }
        let found = store.find(GUILD, "OP").await.unwrap();
        assert_eq!(names(&found), vec!["Operator", "Co-Op"]);
        assert!(store.find(GUILD, "xyz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_guild_cascades() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        assert!(store.remove_guild(GUILD).await.unwrap());
        assert!(store.list(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_only() {
        let store = PoolStore::fallback_only(vec!["Subject".to_string()]);
        assert_eq!(store.pick_random(GUILD).await.unwrap(), "Subject");
        assert!(matches!(
            store.add(&guild_info(), "Baron", OWNER).await,
            Err(NicknameError::DatabaseUnavailable(_))
        ));
        assert!(matches!(
            store.list(GUILD).await,
            Err(NicknameError::DatabaseUnavailable(_))
        ));

        let empty = PoolStore::fallback_only(Vec::new());
        assert!(matches!(
            empty.pick_random(GUILD).await,
            Err(NicknameError::EmptyPool)
        ));
    }

    #[tokio::test]
    async fn test_fallback_when_database_fails() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.pool().close().await;
        let store = PoolStore::new(Some(db), vec!["Subject".to_string()]);
        assert_eq!(store.pick_random(GUILD).await.unwrap(), "Subject");
        assert_eq!(store.health(GUILD).await.state, DatabaseState::Degraded);
    }

    #[tokio::test]
    async fn test_health_counts() {
        let store = store().await;
        store.add(&guild_info(), "Baron", OWNER).await.unwrap();
        let health = store.health(GUILD).await;
        assert_eq!(health.state, DatabaseState::Connected);
        assert_eq!(health.nicknames, Some(1));
        assert_eq!(health.guilds, Some(1));
        assert_eq!(health.fallback_size, 1);

        let health = PoolStore::fallback_only(Vec::new()).health(GUILD).await;
        assert_eq!(health.state, DatabaseState::NotConfigured);
    }
}
