use crate::session::{Session, UnresolvedRestore};
use crate::store::{DatabaseState, NicknameRecord, StoreHealth};
use poise::serenity_prelude::{CreateEmbed, UserId};
use std::fmt::{Display, Formatter};
use std::fmt::Write as _;

/// Lines shown per embed field before truncating
pub const MAX_LIST_LINES: usize = 20;

/// Overall verdict of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    /// Database missing, fallback pool in use
    Limited,
    /// Database configured but failing
    Degraded,
    /// Bot cannot rename members
    Impaired,
}

impl Display for HealthLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Limited => write!(f, "⚠️ Limited (No Database)"),
            Self::Degraded => write!(f, "⚠️ Degraded (DB Issues)"),
            Self::Impaired => write!(f, "❌ Impaired (No Permissions)"),
        }
    }
}

/// Everything the health command reports for one guild
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub guild_name: String,
    pub store: StoreHealth,
    pub tracked_in_guild: usize,
    pub tracked_total: usize,
    pub unresolved_in_guild: usize,
    /// `None` when the bot's member is not cached
    pub can_manage_nicknames: Option<bool>,
    pub uptime: chrono::Duration,
}

impl HealthReport {
    #[must_use]
    pub fn level(&self) -> HealthLevel {
        if self.can_manage_nicknames == Some(false) {
            HealthLevel::Impaired
        } else {
            match self.store.state {
                DatabaseState::NotConfigured => HealthLevel::Limited,
                DatabaseState::Degraded => HealthLevel::Degraded,
                DatabaseState::Connected => HealthLevel::Healthy,
            }
        }
    }

    /// Suggested fixes, most important first
    #[must_use]
    pub fn recommendations(&self) -> Vec<&'static str> {
        let mut tips = Vec::new();
        if self.can_manage_nicknames == Some(false) {
            tips.push("• Grant the bot the 'Manage Nicknames' permission");
        }
        if self.store.nicknames == Some(0) {
            tips.push("• Add nicknames with `/add_nickname`");
        }
        if self.store.state == DatabaseState::NotConfigured {
            tips.push("• Database features unavailable (using fallback nicknames)");
        }
        if self.unresolved_in_guild > 0 {
            tips.push("• Run `/restore` for members listed under failed restorations in `/status`");
        }
        tips
    }

    #[must_use]
    pub fn embed(&self) -> CreateEmbed {
        let nicknames = self
            .store
            .nicknames
            .map_or_else(|| "unknown".to_string(), |count| count.to_string());
        let permission = match self.can_manage_nicknames {
            Some(true) => "✅ Granted",
            Some(false) => "❌ Missing",
            None => "❔ Unknown",
        };

        let mut embed = CreateEmbed::new()
            .title("🤖 Bot Health Report")
            .description(format!("Status report for **{}**", self.guild_name))
            .field(
                "💾 Database",
                format!(
                    "**Status:** {}\n**Nicknames:** {nicknames} configured\n**Fallback pool:** {}",
                    self.store.state, self.store.fallback_size
                ),
                true,
            )
            .field(
                "🎤 Voice Tracking",
                format!(
                    "**Here:** {} members\n**All servers:** {}\n**Failed restores:** {}",
                    self.tracked_in_guild, self.tracked_total, self.unresolved_in_guild
                ),
                true,
            )
            .field(
                "🔐 Permissions",
                format!("**Manage Nicknames:** {permission}"),
                true,
            )
            .field("📊 Overall Health", self.level().to_string(), false);

        let tips = self.recommendations();
        if !tips.is_empty() {
            embed = embed.field("💡 Recommendations", tips.join("\n"), false);
        }
        embed.footer(poise::serenity_prelude::CreateEmbedFooter::new(format!(
            "Uptime: {}",
            format_duration(self.uptime)
        )))
    }
}

/// `1d 2h 3m` style duration
#[must_use]
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Join lines, keeping at most [`MAX_LIST_LINES`] and noting the rest
#[must_use]
pub fn capped_lines(lines: &[String]) -> String {
    let mut out = lines
        .iter()
        .take(MAX_LIST_LINES)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > MAX_LIST_LINES {
        let _ = write!(out, "\n*...and {} more*", lines.len() - MAX_LIST_LINES);
    }
    out
}

/// Numbered nickname list
#[must_use]
pub fn nickname_lines(records: &[NicknameRecord]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| format!("`{:2}.` **{}**", i + 1, record.nickname))
        .collect()
}

/// One line per tracked member
#[must_use]
pub fn session_lines(sessions: &[(UserId, Session)]) -> Vec<String> {
    sessions
        .iter()
        .map(|(user_id, session)| {
            format!(
                "• <@{user_id}> `{}` (was `{}`) since <t:{}:R>",
                session.assigned.as_deref().unwrap_or("pending"),
                session.original_display(),
                session.started_at.timestamp()
            )
        })
        .collect()
}

/// One line per failed restoration
#[must_use]
pub fn unresolved_lines(restores: &[(UserId, UnresolvedRestore)]) -> Vec<String> {
    restores
        .iter()
        .map(|(user_id, restore)| {
            format!(
                "• <@{user_id}> should be `{}` (failed <t:{}:R>)",
                restore.session.original_display(),
                restore.failed_at.timestamp()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(
        state: DatabaseState,
        can_manage: Option<bool>,
        nicknames: Option<usize>,
    ) -> HealthReport {
        HealthReport {
            guild_name: "Lounge".to_string(),
            store: StoreHealth {
                state,
                nicknames,
                guilds: Some(1),
                fallback_size: 10,
            },
            tracked_in_guild: 2,
            tracked_total: 5,
            unresolved_in_guild: 0,
            can_manage_nicknames: can_manage,
            uptime: chrono::Duration::minutes(90),
        }
    }

    #[test]
    fn test_health_levels() {
        assert_eq!(
            report(DatabaseState::Connected, Some(true), Some(3)).level(),
            HealthLevel::Healthy
        );
        assert_eq!(
            report(DatabaseState::NotConfigured, Some(true), None).level(),
            HealthLevel::Limited
        );
        assert_eq!(
            report(DatabaseState::Degraded, None, None).level(),
            HealthLevel::Degraded
        );
        assert_eq!(
            report(DatabaseState::Connected, Some(false), Some(3)).level(),
            HealthLevel::Impaired
        );
    }

    #[test]
    fn test_recommendations() {
        assert!(
            report(DatabaseState::Connected, Some(true), Some(3))
                .recommendations()
                .is_empty()
        );

        let tips = report(DatabaseState::Connected, Some(false), Some(0)).recommendations();
        assert_eq!(tips.len(), 2);
        assert!(tips[0].contains("Manage Nicknames"));
        assert!(tips[1].contains("/add_nickname"));

        let mut with_failures = report(DatabaseState::NotConfigured, Some(true), None);
        with_failures.unresolved_in_guild = 1;
        let tips = with_failures.recommendations();
        assert!(tips.iter().any(|tip| tip.contains("fallback")));
        assert!(tips.iter().any(|tip| tip.contains("/restore")));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_duration(chrono::Duration::minutes(90)), "1h 30m");
        assert_eq!(format_duration(chrono::Duration::hours(49)), "2d 1h 0m");
        assert_eq!(format_duration(chrono::Duration::seconds(-3)), "0m");
    }

    #[test]
    fn test_capped_lines() {
        let few: Vec<String> = (1..=3).map(|i| i.to_string()).collect();
        assert_eq!(capped_lines(&few), "1\n2\n3");

        let many: Vec<String> = (1..=25).map(|i| i.to_string()).collect();
        let out = capped_lines(&many);
        assert_eq!(out.lines().count(), MAX_LIST_LINES + 1);
        assert!(out.ends_with("*...and 5 more*"));
    }

    #[test]
    fn test_session_lines() {
        let mut session = Session::new(Some("Alice".to_string()), "Alice");
        session.assigned = Some("Baron 001".to_string());
        let lines = session_lines(&[(UserId::new(10), session)]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("• <@10> `Baron 001` (was `Alice`)"));
    }
}
