//! Environment-driven bot configuration
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.0.0: Initial release with token, store path, admin chat and log level

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::features::reminders::ChatId;

/// Default location of the reminder store document
pub const DEFAULT_STORE_PATH: &str = "reminders.json";

/// Default log filter when neither `LOG_LEVEL` nor `RUST_LOG` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    /// Path of the JSON document holding every committed reminder
    pub store_path: PathBuf,
    /// Chat that receives startup notices and server-side save failures
    pub admin_chat_id: Option<ChatId>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .context("DISCORD_TOKEN must be set")?;

        let store_path = lookup("REMINDER_STORE_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())
            .into();

        let admin_chat_id = match lookup("ADMIN_CHAT_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<ChatId>()
                    .with_context(|| format!("ADMIN_CHAT_ID is not a valid chat id: {raw}"))?,
            ),
            None => None,
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Config {
            discord_token,
            store_path,
            admin_chat_id,
            log_level,
        })
    }
}
