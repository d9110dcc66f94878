//! Process configuration
//!
//! Settings come from environment variables, optionally seeded from a `.env`
//! file. The fallback nickname pool can be overridden with a YAML file.

use crate::nickname::DEFAULT_FALLBACK_NICKNAMES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
const TOKEN_ALIAS_VAR: &str = "DISCORD_BOT_TOKEN";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const FALLBACK_FILE_VAR: &str = "FALLBACK_NICKNAMES_FILE";
/// Used when `FALLBACK_NICKNAMES_FILE` is unset
pub const DEFAULT_FALLBACK_FILE: &str = "config/fallback_nicknames.yaml";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Shape of the fallback nickname file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackFile {
    pub nicknames: Vec<String>,
}

/// Bot configuration
#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    /// `None` runs the bot on the fallback pool only
    pub database_url: Option<String>,
    pub fallback_nicknames: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"***")
            .field("database_url", &self.database_url.as_ref().map(|_| "***"))
            .field("fallback_nicknames", &self.fallback_nicknames)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or the fallback file cannot
    /// be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or the fallback file cannot
    /// be read or parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let discord_token = non_empty(TOKEN_VAR)
            .or_else(|| non_empty(TOKEN_ALIAS_VAR))
            .ok_or(ConfigError::MissingVar(TOKEN_VAR))?;

        let database_url = non_empty(DATABASE_URL_VAR);

        let fallback_nicknames = match non_empty(FALLBACK_FILE_VAR) {
            // An explicitly configured file must exist
            Some(path) => load_fallback(Path::new(&path))?,
            None if Path::new(DEFAULT_FALLBACK_FILE).exists() => {
                load_fallback(Path::new(DEFAULT_FALLBACK_FILE))?
            }
            None => default_fallback(),
        };

        Ok(Self {
            discord_token,
            database_url,
            fallback_nicknames,
        })
    }
}

/// Built-in fallback pool
#[must_use]
pub fn default_fallback() -> Vec<String> {
    DEFAULT_FALLBACK_NICKNAMES
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Read a fallback pool from a YAML file
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid YAML.
pub fn load_fallback(path: &Path) -> Result<Vec<String>, ConfigError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    parse_fallback(&content).map_err(|source| ConfigError::Yaml {
        path: display,
        source,
    })
}

fn parse_fallback(content: &str) -> Result<Vec<String>, serde_yaml::Error> {
    let file: FallbackFile = serde_yaml::from_str(content)?;
    Ok(file
        .nicknames
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}
