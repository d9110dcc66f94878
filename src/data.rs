use std::{ops::Deref, sync::Arc};

use crate::session::SessionTracker;
use crate::store::PoolStore;
use chrono::{DateTime, Utc};

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("sessions", &self.sessions)
            .field("pool", &self.pool)
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create a new Data instance around a pool store
    #[must_use]
    pub fn new(pool: PoolStore) -> Self {
        Self(Arc::new(DataInner::new(pool)))
    }

    /// Time since the process started tracking sessions
    #[must_use]
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// State shared by the event handler and commands
pub struct DataInner {
    // Map of (guild_id, user_id) -> original nickname while renamed
    pub sessions: SessionTracker,
    // Per-guild nickname pools
    pub pool: PoolStore,
    pub started_at: DateTime<Utc>,
}

impl DataInner {
    #[must_use]
    pub fn new(pool: PoolStore) -> Self {
        Self {
            sessions: SessionTracker::new(),
            pool,
            started_at: Utc::now(),
        }
    }
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_new() {
        let data = Data::new(PoolStore::fallback_only(vec!["Subject".to_string()]));
        assert!(data.sessions.is_empty());
        assert!(!data.pool.has_database());
        assert!(data.uptime() >= chrono::Duration::zero());
    }

    #[test]
    fn test_clones_share_sessions() {
        let data = Data::new(PoolStore::fallback_only(Vec::new()));
        let clone = data.clone();
        let guild = poise::serenity_prelude::GuildId::new(1);
        let user = poise::serenity_prelude::UserId::new(2);
        let claim = clone
            .sessions
            .claim(guild, user, crate::session::Session::new(None, "x"));
        assert!(claim.is_some());
        assert!(data.sessions.contains(guild, user));
    }

    #[test]
    fn test_data_debug_impl() {
        let data = Data::new(PoolStore::fallback_only(Vec::new()));
        let debug_output = format!("{data:?}");
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("sessions"));
        assert!(debug_output.contains("pool"));
    }
}
