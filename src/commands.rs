use crate::error::NicknameError;
use crate::status::{self, HealthReport};
use crate::store::GuildInfo;
use crate::voice::{self, SerenityNicknameEditor};
use crate::{COMMAND_TARGET, Context, Data, Error, logging};
use poise::serenity_prelude::{self as serenity, CreateEmbed, Mentionable};
use poise::{CreateReply, FrameworkError};
use tracing::{info, warn};

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        add_nickname(),
        remove_nickname(),
        list_nicknames(),
        find_nickname(),
        status(),
        restore(),
        health(),
    ]
}

/// Check that the invoking user owns the guild
pub async fn is_guild_owner(ctx: Context<'_>) -> Result<bool, Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(false);
    };
    let cached = ctx.guild().map(|guild| guild.owner_id);
    let owner_id = match cached {
        Some(owner_id) => owner_id,
        None => guild_id.to_partial_guild(ctx.http()).await?.owner_id,
    };
    Ok(owner_id == ctx.author().id)
}

/// Add a new nickname to the server
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn add_nickname(
    ctx: Context<'_>,
    #[description = "The nickname to add (will be formatted as 'Nickname 001')"] nickname: String,
) -> Result<(), Error> {
    let guild = guild_info(ctx).await?;
    match ctx.data().pool.add(&guild, &nickname, ctx.author().id).await {
        Ok(record) => {
            info!(
                target: COMMAND_TARGET,
                guild_id = %guild.id,
                user_id = %ctx.author().id,
                nickname = %record.nickname,
                "Nickname added"
            );
            reply(ctx, format!("✅ Added nickname: **{}**", record.nickname)).await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// Remove a nickname from the server
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn remove_nickname(
    ctx: Context<'_>,
    #[description = "The nickname to remove"] nickname: String,
) -> Result<(), Error> {
    let guild_id = require_guild(ctx)?;
    match ctx.data().pool.remove(guild_id, &nickname).await {
        Ok(removed) => {
            info!(
                target: COMMAND_TARGET,
                guild_id = %guild_id,
                user_id = %ctx.author().id,
                nickname = %removed,
                "Nickname removed"
            );
            reply(ctx, format!("✅ Nickname **{removed}** removed.")).await
        }
        Err(e) => reply_error(ctx, &e).await,
    }
}

/// List all active nicknames for this server
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn list_nicknames(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = require_guild(ctx)?;
    let records = match ctx.data().pool.list(guild_id).await {
        Ok(records) => records,
        Err(e) => return reply_error(ctx, &e).await,
    };

    let embed = if records.is_empty() {
        CreateEmbed::new()
            .title("📝 Nickname Pool")
            .description("No nicknames configured for this server.\nUse `/add_nickname` to add some!")
            .color(serenity::Colour::ORANGE)
    } else {
        CreateEmbed::new()
            .title(format!("📝 Nickname Pool ({} total)", records.len()))
            .description(status::capped_lines(&status::nickname_lines(&records)))
            .field(
                "ℹ️ Usage",
                "Nicknames are picked at random and formatted as: `Nickname 001`",
                false,
            )
            .color(serenity::Colour::BLUE)
    };
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Search the server's nicknames
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn find_nickname(
    ctx: Context<'_>,
    #[description = "Text to search for"] search_term: String,
) -> Result<(), Error> {
    let guild_id = require_guild(ctx)?;
    let matches = match ctx.data().pool.find(guild_id, &search_term).await {
        Ok(matches) => matches,
        Err(e) => return reply_error(ctx, &e).await,
    };

    let embed = if matches.is_empty() {
        CreateEmbed::new()
            .title("🔍 Search Results")
            .description(format!("No nicknames found containing: **{search_term}**"))
            .color(serenity::Colour::RED)
    } else {
        CreateEmbed::new()
            .title("🔍 Search Results")
            .description(format!(
                "Found {} nickname(s) containing: **{search_term}**\n\n{}",
                matches.len(),
                status::capped_lines(&status::nickname_lines(&matches))
            ))
            .color(serenity::Colour::DARK_GREEN)
    };
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Show members currently holding a temporary nickname
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = require_guild(ctx)?;
    let data = ctx.data();
    let sessions = data.sessions.for_guild(guild_id);
    let unresolved = data.sessions.unresolved_for_guild(guild_id);

    let tracked = if sessions.is_empty() {
        "Nobody is wearing a temporary nickname.".to_string()
    } else {
        status::capped_lines(&status::session_lines(&sessions))
    };

    let mut embed = CreateEmbed::new()
        .title("🤖 Voice Nickname Status")
        .description(format!(
            "Tracking **{}** member(s) in voice channels",
            sessions.len()
        ))
        .field("👥 Tracked Members", tracked, false)
        .color(serenity::Colour::DARK_GREEN);

    if !unresolved.is_empty() {
        embed = embed.field(
            "⚠️ Failed Restorations",
            status::capped_lines(&status::unresolved_lines(&unresolved)),
            false,
        );
    }

    let pool = if data.pool.has_database() {
        "💾 Database pool"
    } else {
        "💾 Fallback pool (no database)"
    };
    embed = embed.field(
        "ℹ️ How it works",
        format!("Join a voice channel to get a temporary nickname, leave to get yours back.\n{pool}"),
        false,
    );

    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Manually restore a member's nickname
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn restore(
    ctx: Context<'_>,
    #[description = "The member whose nickname to restore (leave empty for yourself)"]
    member: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = require_guild(ctx)?;
    let user_id = member.map_or(ctx.author().id, |user| user.id);
    let editor = SerenityNicknameEditor::new(ctx.http());

    match voice::restore(ctx.data(), &editor, guild_id, user_id).await {
        Ok(session) => {
            reply(
                ctx,
                format!(
                    "✅ Restored {}'s nickname to `{}`",
                    user_id.mention(),
                    session.original_display()
                ),
            )
            .await
        }
        Err(e) => {
            voice::log_failure("restore nickname", guild_id, user_id, &e);
            reply_error(ctx, &e).await
        }
    }
}

/// Comprehensive bot status check
#[poise::command(slash_command, guild_only, check = "is_guild_owner")]
pub async fn health(ctx: Context<'_>) -> Result<(), Error> {
    let guild = guild_info(ctx).await?;
    let data = ctx.data();

    let report = HealthReport {
        store: data.pool.health(guild.id).await,
        tracked_in_guild: data.sessions.for_guild(guild.id).len(),
        tracked_total: data.sessions.len(),
        unresolved_in_guild: data.sessions.unresolved_for_guild(guild.id).len(),
        can_manage_nicknames: bot_can_manage_nicknames(ctx),
        uptime: data.uptime(),
        guild_name: guild.name,
    };

    ctx.send(CreateReply::default().embed(report.embed()).ephemeral(true))
        .await?;
    Ok(())
}

/// Whether the bot's own member has Manage Nicknames, from the cache
fn bot_can_manage_nicknames(ctx: Context<'_>) -> Option<bool> {
    let bot_id = ctx.serenity_context().cache.current_user().id;
    let guild = ctx.guild()?;
    let member = guild.members.get(&bot_id)?;
    Some(guild.member_permissions(member).manage_nicknames())
}

fn require_guild(ctx: Context<'_>) -> Result<serenity::GuildId, Error> {
    Ok(ctx.guild_id().ok_or("This command only works in a server")?)
}

/// Guild id, name and owner, from the cache or the API
async fn guild_info(ctx: Context<'_>) -> Result<GuildInfo, Error> {
    let guild_id = require_guild(ctx)?;
    let cached = ctx.guild().map(|guild| GuildInfo {
        id: guild.id,
        name: guild.name.clone(),
        owner_id: guild.owner_id,
    });
    match cached {
        Some(info) => Ok(info),
        None => {
            let guild = guild_id.to_partial_guild(ctx.http()).await?;
            Ok(GuildInfo {
                id: guild.id,
                name: guild.name,
                owner_id: guild.owner_id,
            })
        }
    }
}

async fn reply(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

async fn reply_error(ctx: Context<'_>, error: &NicknameError) -> Result<(), Error> {
    warn!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = ?ctx.guild_id(),
        error = %error,
        "Command rejected"
    );
    reply(ctx, error.user_message()).await
}

/// Framework error hook: log, then tell the user something went wrong
pub async fn on_error(error: FrameworkError<'_, Data, Error>) {
    logging::log_command_error(&error);

    let (ctx, message) = match error {
        FrameworkError::Command { ctx, .. } => {
            (ctx, "❌ An error occurred while processing the command.")
        }
        FrameworkError::CommandCheckFailed { ctx, error: None, .. } => {
            (ctx, "❌ Only the server owner can use this command.")
        }
        FrameworkError::CommandCheckFailed { ctx, .. } => {
            (ctx, "❌ Could not verify your permissions, try again.")
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                warn!(
                    target: crate::ERROR_TARGET,
                    error = %e,
                    "Error while handling framework error"
                );
            }
            return;
        }
    };

    if let Err(e) = reply(ctx, message).await {
        warn!(target: crate::ERROR_TARGET, error = %e, "Failed to send error reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        let names: Vec<String> = all().into_iter().map(|cmd| cmd.name).collect();
        assert_eq!(
            names,
            vec![
                "add_nickname",
                "remove_nickname",
                "list_nicknames",
                "find_nickname",
                "status",
                "restore",
                "health"
            ]
        );
    }

    #[test]
    fn test_commands_are_guild_only_and_owner_gated() {
        for cmd in all() {
            assert!(cmd.guild_only, "{} should be guild only", cmd.name);
            assert_eq!(cmd.checks.len(), 1, "{} should have the owner check", cmd.name);
            assert!(cmd.create_as_slash_command().is_some());
        }
    }

    #[test]
    fn test_add_nickname_definition() {
        let cmd = add_nickname();
        assert!(
            cmd.description
                .unwrap_or_default()
                .contains("Add a new nickname")
        );
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.parameters[0].name, "nickname");
        assert!(cmd.parameters[0].required);
    }

    #[test]
    fn test_restore_member_is_optional() {
        let cmd = restore();
        assert_eq!(cmd.parameters.len(), 1);
        assert!(!cmd.parameters[0].required);
    }
}
