use crate::EVENT_TARGET;
use crate::data::Data;
use crate::store::GuildInfo;
use crate::voice::{
    self, JoinOutcome, LeaveOutcome, MemberSnapshot, SerenityNicknameEditor, VoiceTransition,
};
use poise::serenity_prelude::{
    self as serenity, ActivityData, Context, EventHandler, Guild, GuildId, Ready, UnavailableGuild,
    VoiceState,
};
use tracing::{debug, error, info, warn};

/// Gateway event handler for voice and guild lifecycle events
pub struct Handler {
    pub data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    /// Snapshot of the member behind a voice state, fetched if not attached
    async fn member_snapshot(
        ctx: &Context,
        guild_id: GuildId,
        state: &VoiceState,
    ) -> Option<MemberSnapshot> {
        if let Some(member) = &state.member {
            return Some(MemberSnapshot::from(member));
        }
        match guild_id.member(ctx, state.user_id).await {
            Ok(member) => Some(MemberSnapshot::from(&member)),
            Err(e) => {
                warn!(
                    target: EVENT_TARGET,
                    guild_id = %guild_id,
                    user_id = %state.user_id,
                    error = %e,
                    "Could not resolve member for voice join"
                );
                None
            }
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
        ctx.set_activity(Some(ActivityData::watching("voice channels")));
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        let info = GuildInfo {
            id: guild.id,
            name: guild.name.clone(),
            owner_id: guild.owner_id,
        };
        if let Err(e) = self.data.pool.ensure_guild(&info).await {
            warn!(
                target: EVENT_TARGET,
                guild_id = %guild.id,
                error = %e,
                "Failed to register guild"
            );
            return;
        }
        if is_new == Some(true) {
            info!(target: EVENT_TARGET, guild_id = %guild.id, name = %guild.name, "Joined guild");
        }
    }

    async fn guild_delete(
        &self,
        _ctx: Context,
        incomplete: UnavailableGuild,
        _full: Option<Guild>,
    ) {
        // Outages also fire this event with `unavailable` set
        if incomplete.unavailable {
            debug!(target: EVENT_TARGET, guild_id = %incomplete.id, "Guild became unavailable");
            return;
        }
        match self.data.pool.remove_guild(incomplete.id).await {
            Ok(_) => info!(
                target: EVENT_TARGET,
                guild_id = %incomplete.id,
                "Removed from guild, pool deleted"
            ),
            Err(e) => warn!(
                target: EVENT_TARGET,
                guild_id = %incomplete.id,
                error = %e,
                "Failed to delete guild pool"
            ),
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let transition = VoiceTransition::classify(
            old.as_ref().and_then(|state| state.channel_id),
            new.channel_id,
        );
        let editor = SerenityNicknameEditor::new(&ctx.http);

        match transition {
            VoiceTransition::Joined(channel_id) => {
                let Some(member) = Self::member_snapshot(&ctx, guild_id, &new).await else {
                    return;
                };
                match voice::handle_join(&self.data, &editor, &member).await {
                    Ok(JoinOutcome::Renamed(_)) => {
                        debug!(
                            target: EVENT_TARGET,
                            guild_id = %guild_id,
                            channel_id = %channel_id,
                            "Voice join handled"
                        );
                    }
                    Ok(
                        JoinOutcome::AlreadyTracked
                        | JoinOutcome::IgnoredBot
                        | JoinOutcome::Undone,
                    ) => {}
                    Err(e) => {
                        voice::log_failure("assign nickname", guild_id, member.user_id, &e);
                    }
                }
            }
            VoiceTransition::Left(_) => {
                match voice::handle_leave(&self.data, &editor, guild_id, new.user_id).await {
                    LeaveOutcome::RestoreFailed(session) => {
                        error!(
                            target: EVENT_TARGET,
                            guild_id = %guild_id,
                            user_id = %new.user_id,
                            session = %session,
                            "Nickname left unrestored, use /restore"
                        );
                    }
                    LeaveOutcome::Restored(_) | LeaveOutcome::NotTracked => {}
                }
            }
            VoiceTransition::Moved { from, to } => {
                debug!(
                    target: EVENT_TARGET,
                    guild_id = %guild_id,
                    user_id = %new.user_id,
                    from = %from,
                    to = %to,
                    "Member moved channels, keeping nickname"
                );
            }
            VoiceTransition::Unchanged => {}
        }
    }
}
