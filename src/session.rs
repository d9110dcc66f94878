//! In-memory tracking of temporary nickname sessions
//!
//! A session maps a (guild, member) pair to the nickname the member had before
//! the bot renamed them. Sessions live only in memory and are lost on restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use poise::serenity_prelude::{GuildId, UserId};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key of a session
pub type SessionKey = (GuildId, UserId);

/// A member's original nickname while they hold a temporary one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server nickname before the rename, `None` if the member had none
    pub original_nick: Option<String>,
    /// Display name at join time
    pub display_name: String,
    /// Temporary nickname, `None` while the rename is still in flight
    pub assigned: Option<String>,
    /// When the member joined voice
    pub started_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(original_nick: Option<String>, display_name: impl Into<String>) -> Self {
        Self {
            original_nick,
            display_name: display_name.into(),
            assigned: None,
            started_at: Utc::now(),
        }
    }

    /// Name the member will show once restored
    #[must_use]
    pub fn original_display(&self) -> &str {
        self.original_nick.as_deref().unwrap_or(&self.display_name)
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.original_display(),
            self.assigned.as_deref().unwrap_or("(pending)")
        )
    }
}

/// A session whose restore failed when the member left voice
#[derive(Debug, Clone)]
pub struct UnresolvedRestore {
    pub session: Session,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Identifies one claim on a member's session
///
/// A join that finishes late can only confirm or abandon the claim it made,
/// never a session claimed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimId(u64);

#[derive(Debug, Clone)]
struct Tracked {
    claim: ClaimId,
    session: Session,
}

/// Tracker for active sessions and failed restorations
#[derive(Clone, Default)]
pub struct SessionTracker {
    sessions: Arc<DashMap<SessionKey, Tracked>>,
    unresolved: Arc<DashMap<SessionKey, UnresolvedRestore>>,
    next_claim: Arc<AtomicU64>,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("sessions", &self.sessions.len())
            .field("unresolved", &self.unresolved.len())
            .finish()
    }
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a session for a member
    ///
    /// Returns `None` without touching the stored session if the member is
    /// already tracked, so the original nickname is never overwritten.
    #[must_use]
    pub fn claim(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        session: Session,
    ) -> Option<ClaimId> {
        match self.sessions.entry((guild_id, user_id)) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let claim = ClaimId(self.next_claim.fetch_add(1, Ordering::Relaxed));
                entry.insert(Tracked { claim, session });
                Some(claim)
            }
        }
    }

    /// Record the temporary nickname of a claimed session
    ///
    /// Returns `false` if the claim is gone, i.e. the member left or was
    /// restored while the rename was in flight.
    #[must_use]
    pub fn confirm(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        claim: ClaimId,
        assigned: impl Into<String>,
    ) -> bool {
        match self.sessions.get_mut(&(guild_id, user_id)) {
            Some(mut tracked) if tracked.claim == claim => {
                tracked.session.assigned = Some(assigned.into());
                true
            }
            _ => false,
        }
    }

    /// Drop a claim that did not lead to a rename
    pub fn abandon(&self, guild_id: GuildId, user_id: UserId, claim: ClaimId) {
        self.sessions
            .remove_if(&(guild_id, user_id), |_, tracked| tracked.claim == claim);
    }

    /// Remove and return a member's session
    pub fn take(&self, guild_id: GuildId, user_id: UserId) -> Option<Session> {
        self.sessions
            .remove(&(guild_id, user_id))
            .map(|(_, tracked)| tracked.session)
    }

    #[must_use]
    pub fn get(&self, guild_id: GuildId, user_id: UserId) -> Option<Session> {
        self.sessions
            .get(&(guild_id, user_id))
            .map(|entry| entry.value().session.clone())
    }

    #[must_use]
    pub fn contains(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.sessions.contains_key(&(guild_id, user_id))
    }

    /// Number of sessions across all guilds
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions of one guild, oldest first
    #[must_use]
    pub fn for_guild(&self, guild_id: GuildId) -> Vec<(UserId, Session)> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| (entry.key().1, entry.value().session.clone()))
            .collect();
        sessions.sort_by_key(|(_, session)| session.started_at);
        sessions
    }

    /// Temporary nicknames currently assigned in a guild
    #[must_use]
    pub fn assigned_in_guild(&self, guild_id: GuildId) -> HashSet<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .filter_map(|entry| entry.value().session.assigned.clone())
            .collect()
    }

    /// Remember a session whose restore failed
    pub fn mark_unresolved(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        session: Session,
        reason: impl Into<String>,
    ) {
        self.unresolved.insert(
            (guild_id, user_id),
            UnresolvedRestore {
                session,
                reason: reason.into(),
                failed_at: Utc::now(),
            },
        );
    }

    pub fn take_unresolved(&self, guild_id: GuildId, user_id: UserId) -> Option<UnresolvedRestore> {
        self.unresolved
            .remove(&(guild_id, user_id))
            .map(|(_, restore)| restore)
    }

    #[must_use]
    pub fn unresolved_for_guild(&self, guild_id: GuildId) -> Vec<(UserId, UnresolvedRestore)> {
        let mut restores: Vec<_> = self
            .unresolved
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect();
        restores.sort_by_key(|(_, restore)| restore.failed_at);
        restores
    }

    #[must_use]
    pub fn unresolved_len(&self) -> usize {
        self.unresolved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1000);
    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    #[test]
    fn test_claim_is_idempotent() {
        let tracker = SessionTracker::new();
        let claim = tracker
            .claim(GUILD, ALICE, Session::new(Some("Alice".into()), "Alice"))
            .unwrap();
        assert!(tracker.confirm(GUILD, ALICE, claim, "Baron 001"));

        // A second join must not replace the original with the temporary name
        let second = tracker.claim(
            GUILD,
            ALICE,
            Session::new(Some("Baron 001".into()), "Baron 001"),
        );
        assert!(second.is_none());

        let session = tracker.get(GUILD, ALICE).unwrap();
        assert_eq!(session.original_nick.as_deref(), Some("Alice"));
        assert_eq!(session.assigned.as_deref(), Some("Baron 001"));
    }

    #[test]
    fn test_take_removes() {
        let tracker = SessionTracker::new();
        assert!(tracker.claim(GUILD, ALICE, Session::new(None, "alice")).is_some());
        assert!(tracker.contains(GUILD, ALICE));

        let session = tracker.take(GUILD, ALICE).unwrap();
        assert_eq!(session.original_display(), "alice");
        assert!(!tracker.contains(GUILD, ALICE));
        assert!(tracker.take(GUILD, ALICE).is_none());
    }

    #[test]
    fn test_sessions_are_keyed_per_guild() {
        let tracker = SessionTracker::new();
        let other_guild = GuildId::new(2000);
        let claims = [
            tracker.claim(GUILD, ALICE, Session::new(Some("Alice".into()), "Alice")),
            tracker.claim(other_guild, ALICE, Session::new(Some("Ally".into()), "Ally")),
            tracker.claim(GUILD, BOB, Session::new(None, "bob")),
        ];
        assert!(claims.iter().all(Option::is_some));

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.for_guild(GUILD).len(), 2);
        assert_eq!(tracker.for_guild(other_guild).len(), 1);
        assert_eq!(
            tracker.get(other_guild, ALICE).unwrap().original_nick.as_deref(),
            Some("Ally")
        );
    }

    #[test]
    fn test_assigned_in_guild_skips_pending() {
        let tracker = SessionTracker::new();
        let alice = tracker.claim(GUILD, ALICE, Session::new(None, "alice")).unwrap();
        assert!(tracker.claim(GUILD, BOB, Session::new(None, "bob")).is_some());
        assert!(tracker.confirm(GUILD, ALICE, alice, "Unit 007"));

        let assigned = tracker.assigned_in_guild(GUILD);
        assert_eq!(assigned.len(), 1);
        assert!(assigned.contains("Unit 007"));
    }

    #[test]
    fn test_abandon_and_unresolved() {
        let tracker = SessionTracker::new();
        let claim = tracker.claim(GUILD, ALICE, Session::new(None, "alice")).unwrap();
        tracker.abandon(GUILD, ALICE, claim);
        assert!(tracker.is_empty());

        tracker.mark_unresolved(GUILD, BOB, Session::new(Some("Bob".into()), "Bob"), "403");
        assert_eq!(tracker.unresolved_len(), 1);
        assert_eq!(tracker.unresolved_for_guild(GUILD).len(), 1);

        let restore = tracker.take_unresolved(GUILD, BOB).unwrap();
        assert_eq!(restore.reason, "403");
        assert_eq!(tracker.unresolved_len(), 0);
    }

    #[test]
    fn test_stale_claim_cannot_touch_newer_session() {
        let tracker = SessionTracker::new();
        let first = tracker
            .claim(GUILD, ALICE, Session::new(Some("Alice".into()), "Alice"))
            .unwrap();

        // The member leaves and joins again before the first rename finishes
        assert!(tracker.take(GUILD, ALICE).is_some());
        assert!(!tracker.confirm(GUILD, ALICE, first, "Baron 001"));
        let second = tracker
            .claim(GUILD, ALICE, Session::new(Some("Alice".into()), "Alice"))
            .unwrap();
        assert_ne!(first, second);

        assert!(!tracker.confirm(GUILD, ALICE, first, "Baron 001"));
        tracker.abandon(GUILD, ALICE, first);
        let session = tracker.get(GUILD, ALICE).unwrap();
        assert_eq!(session.assigned, None);

        assert!(tracker.confirm(GUILD, ALICE, second, "Unit 002"));
        assert_eq!(
            tracker.get(GUILD, ALICE).unwrap().assigned.as_deref(),
            Some("Unit 002")
        );
    }

    #[test]
    fn test_session_display() {
        let mut session = Session::new(Some("Alice".into()), "Alice");
        assert_eq!(session.to_string(), "Alice -> (pending)");
        session.assigned = Some("Baron 001".into());
        assert_eq!(session.to_string(), "Alice -> Baron 001");
    }
}
