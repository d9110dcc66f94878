//! Voice channel session handling
//!
//! Joining voice claims a session, picks a nickname from the guild's pool and
//! renames the member. Leaving voice restores the stored nickname. Renames go
//! through [`NicknameEditor`] so the flow can run without a Discord connection.

use crate::data::Data;
use crate::error::{NicknameError, NicknameResult};
use crate::session::Session;
use crate::{EVENT_TARGET, nickname};
use poise::serenity_prelude::{ChannelId, EditMember, GuildId, Http, Member, UserId};
use tracing::{debug, error, info, warn};

const AUDIT_REASON: &str = "Voice channel temporary nickname";

/// Seam for changing a member's nickname
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NicknameEditor: Send + Sync {
    /// Set a member's server nickname; `None` clears it
    async fn set_nickname(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        nickname: Option<String>,
    ) -> NicknameResult<()>;
}

/// Editor backed by the Discord HTTP API
pub struct SerenityNicknameEditor<'a> {
    http: &'a Http,
}

impl<'a> SerenityNicknameEditor<'a> {
    #[must_use]
    pub fn new(http: &'a Http) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl NicknameEditor for SerenityNicknameEditor<'_> {
    async fn set_nickname(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        nickname: Option<String>,
    ) -> NicknameResult<()> {
        // An empty nickname resets the member to their username
        let builder = EditMember::new()
            .nickname(nickname.unwrap_or_default())
            .audit_log_reason(AUDIT_REASON);
        guild_id.edit_member(self.http, user_id, builder).await?;
        Ok(())
    }
}

/// How a voice state update changed a member's channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTransition {
    Joined(ChannelId),
    Left(ChannelId),
    Moved { from: ChannelId, to: ChannelId },
    Unchanged,
}

impl VoiceTransition {
    #[must_use]
    pub fn classify(old: Option<ChannelId>, new: Option<ChannelId>) -> Self {
        match (old, new) {
            (None, Some(to)) => Self::Joined(to),
            (Some(from), None) => Self::Left(from),
            (Some(from), Some(to)) if from != to => Self::Moved { from, to },
            _ => Self::Unchanged,
        }
    }
}

/// The parts of a member the session logic needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub nick: Option<String>,
    pub display_name: String,
    pub bot: bool,
}

impl From<&Member> for MemberSnapshot {
    fn from(member: &Member) -> Self {
        Self {
            guild_id: member.guild_id,
            user_id: member.user.id,
            nick: member.nick.clone(),
            display_name: member.display_name().to_string(),
            bot: member.user.bot,
        }
    }
}

/// Result of handling a voice join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Renamed(String),
    AlreadyTracked,
    IgnoredBot,
    /// The member left mid-rename and the original nickname was put back
    Undone,
}

/// Result of handling a voice leave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    Restored(Session),
    /// The restore call failed; the session was moved to the unresolved list
    RestoreFailed(Session),
    NotTracked,
}

/// Rename a member who just joined voice
///
/// # Errors
///
/// Returns `EmptyPool` if the guild has no nicknames, or the editor's error if
/// the rename was refused. In both cases no session is left behind. If the
/// member left while the rename was in flight and undoing it fails, the
/// original is kept as an unresolved restoration and the error returned.
pub async fn handle_join(
    data: &Data,
    editor: &dyn NicknameEditor,
    member: &MemberSnapshot,
) -> NicknameResult<JoinOutcome> {
    let MemberSnapshot {
        guild_id, user_id, ..
    } = *member;

    if member.bot {
        return Ok(JoinOutcome::IgnoredBot);
    }

    let session = Session::new(member.nick.clone(), member.display_name.clone());
    let Some(claim) = data.sessions.claim(guild_id, user_id, session.clone()) else {
        debug!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user_id,
            "Member already tracked, ignoring join"
        );
        return Ok(JoinOutcome::AlreadyTracked);
    };

    if member.nick.as_deref().is_some_and(nickname::is_temporary) {
        warn!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user_id,
            nickname = ?member.nick,
            "Stored original looks like a temporary nickname"
        );
    }

    let base = match data.pool.pick_random(guild_id).await {
        Ok(base) => base,
        Err(e) => {
            data.sessions.abandon(guild_id, user_id, claim);
            return Err(e);
        }
    };
    let assigned = nickname::assign(&base, &data.sessions.assigned_in_guild(guild_id));

    if let Err(e) = editor
        .set_nickname(guild_id, user_id, Some(assigned.clone()))
        .await
    {
        data.sessions.abandon(guild_id, user_id, claim);
        return Err(e);
    }

    if !data
        .sessions
        .confirm(guild_id, user_id, claim, assigned.clone())
    {
        return undo_late_rename(data, editor, guild_id, user_id, session, assigned).await;
    }

    info!(
        target: EVENT_TARGET,
        guild_id = %guild_id,
        user_id = %user_id,
        original = %member.display_name,
        nickname = %assigned,
        event = "renamed",
        "Assigned temporary nickname"
    );
    Ok(JoinOutcome::Renamed(assigned))
}

/// Put back the original nickname after a rename that finished too late
///
/// The member left voice, or was restored, while the rename was in flight, so
/// the claim is gone and nothing else will undo the temporary nickname.
async fn undo_late_rename(
    data: &Data,
    editor: &dyn NicknameEditor,
    guild_id: GuildId,
    user_id: UserId,
    mut session: Session,
    assigned: String,
) -> NicknameResult<JoinOutcome> {
    warn!(
        target: EVENT_TARGET,
        guild_id = %guild_id,
        user_id = %user_id,
        nickname = %assigned,
        "Member left before the rename finished, undoing it"
    );

    // A newer join already owns the member's nickname
    if data.sessions.contains(guild_id, user_id) {
        return Ok(JoinOutcome::Undone);
    }

    if let Err(e) = editor
        .set_nickname(guild_id, user_id, session.original_nick.clone())
        .await
    {
        log_failure("undo late rename", guild_id, user_id, &e);
        session.assigned = Some(assigned);
        data.sessions
            .mark_unresolved(guild_id, user_id, session, e.to_string());
        return Err(e);
    }
    Ok(JoinOutcome::Undone)
}

/// Restore a member who left voice
///
/// The session is removed whether or not the restore call succeeds.
pub async fn handle_leave(
    data: &Data,
    editor: &dyn NicknameEditor,
    guild_id: GuildId,
    user_id: UserId,
) -> LeaveOutcome {
    let Some(session) = data.sessions.take(guild_id, user_id) else {
        return LeaveOutcome::NotTracked;
    };

    match editor
        .set_nickname(guild_id, user_id, session.original_nick.clone())
        .await
    {
        Ok(()) => {
            info!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                user_id = %user_id,
                nickname = %session.original_display(),
                event = "restored",
                "Restored original nickname"
            );
            LeaveOutcome::Restored(session)
        }
        Err(e) => {
            log_failure("restore nickname", guild_id, user_id, &e);
            data.sessions
                .mark_unresolved(guild_id, user_id, session.clone(), e.to_string());
            LeaveOutcome::RestoreFailed(session)
        }
    }
}

/// Manually restore a member's original nickname
///
/// Resolves an active session first, then a failed restoration.
///
/// # Errors
///
/// Returns `NotFound` if nothing is stored for the member, or the editor's
/// error if the rename fails. A failed attempt is kept as unresolved.
pub async fn restore(
    data: &Data,
    editor: &dyn NicknameEditor,
    guild_id: GuildId,
    user_id: UserId,
) -> NicknameResult<Session> {
    let session = match data.sessions.take(guild_id, user_id) {
        Some(session) => session,
        None => data
            .sessions
            .take_unresolved(guild_id, user_id)
            .map(|restore| restore.session)
            .ok_or_else(|| NicknameError::NotFound(format!("Stored nickname for <@{user_id}>")))?,
    };

    if let Err(e) = editor
        .set_nickname(guild_id, user_id, session.original_nick.clone())
        .await
    {
        data.sessions
            .mark_unresolved(guild_id, user_id, session, e.to_string());
        return Err(e);
    }

    info!(
        target: EVENT_TARGET,
        guild_id = %guild_id,
        user_id = %user_id,
        nickname = %session.original_display(),
        event = "manual_restore",
        "Manually restored nickname"
    );
    Ok(session)
}

/// Log a failed nickname operation at a level matching its severity
pub fn log_failure(action: &str, guild_id: GuildId, user_id: UserId, error: &NicknameError) {
    if error.is_expected() {
        warn!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user_id,
            error = %error,
            "Could not {action}"
        );
    } else {
        error!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user_id,
            error = %error,
            "Failed to {action}"
        );
    }
}
