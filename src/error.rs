//! Error types for nickname sessions and the nickname pool
//!
//! This module defines the errors that can occur while renaming members or
//! managing a guild's nickname pool, and how they are shown to users.

use ::serenity::http::HttpError;
use ::serenity::model::error::Error as ModelError;
use poise::serenity_prelude as serenity;
use thiserror::Error;

/// Errors that can occur during nickname operations
#[derive(Debug, Error)]
pub enum NicknameError {
    /// Discord refused the rename (missing Manage Nicknames, role hierarchy, guild owner)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Discord rate limited the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The guild has no active nicknames configured
    #[error("No active nicknames configured")]
    EmptyPool,

    /// An active nickname with the same text already exists
    #[error("Nickname already exists: {0}")]
    DuplicateNickname(String),

    /// Remove or restore target absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Nickname text rejected before reaching the database
    #[error("Invalid nickname: {0}")]
    InvalidNickname(String),

    /// Database not configured or a query failed
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Any other Discord API error
    #[error("Discord API error: {0}")]
    Discord(Box<serenity::Error>),
}

impl From<serenity::Error> for NicknameError {
    fn from(error: serenity::Error) -> Self {
        let status = match &error {
            serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
                Some(response.status_code.as_u16())
            }
            _ => None,
        };

        match status {
            Some(403) => Self::PermissionDenied(error.to_string()),
            Some(429) => Self::RateLimited(error.to_string()),
            _ if matches!(error, serenity::Error::Model(ModelError::InvalidPermissions { .. })) => {
                Self::PermissionDenied(error.to_string())
            }
            _ => Self::Discord(Box::new(error)),
        }
    }
}

impl From<sqlx::Error> for NicknameError {
    fn from(error: sqlx::Error) -> Self {
        Self::DatabaseUnavailable(error.to_string())
    }
}

impl NicknameError {
    /// Message safe to show in a command reply
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => {
                "❌ I don't have permission to change that member's nickname.".to_string()
            }
            Self::RateLimited(_) => {
                "⏳ Discord is rate limiting nickname changes, try again shortly.".to_string()
            }
            Self::EmptyPool => {
                "📝 No nicknames configured for this server. Use `/add_nickname` to add some!"
                    .to_string()
            }
            Self::DuplicateNickname(name) => format!("❌ Nickname **{name}** already exists."),
            Self::NotFound(what) => format!("❌ {what} not found."),
            Self::InvalidNickname(reason) => format!("❌ {reason}"),
            Self::DatabaseUnavailable(_) => {
                "❌ The nickname database is unavailable right now.".to_string()
            }
            Self::Discord(_) => "❌ Discord rejected the request.".to_string(),
        }
    }

    /// Whether this error is one the event handler expects and only logs at warn level
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::RateLimited(_) | Self::EmptyPool
        )
    }
}

/// Result type for nickname operations
pub type NicknameResult<T> = Result<T, NicknameError>;
