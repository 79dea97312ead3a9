use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info};

use crate::error::{BotError, Result};
use crate::session::ConversationTarget;
use crate::types::Profile;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub conversation: ConversationTarget,
    pub nick_name: String,
    pub profile: Profile,
    pub keepalive_interval: Duration,
    pub settle_delay: Duration,
    pub chunk_interval: Duration,
    pub recordings_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();

        let discord_token = env::var("DISCORD_TOKEN").map_err(|e| {
            error!("Failed to load DISCORD_TOKEN from environment: {}", e);
            e
        })?;

        Self::from_lookup(discord_token, |key| env::var(key).ok())
    }

    /// Build the configuration from a token and a variable lookup.
    pub fn from_lookup(
        discord_token: String,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let conversation = match (var("CONVERSATION_ID"), var("BOT_OWNER_ID")) {
            (Some(conv_id), _) => ConversationTarget::Id(conv_id),
            (None, Some(owner)) => ConversationTarget::DirectWith(owner),
            (None, None) => {
                return Err(BotError::Config(
                    "either CONVERSATION_ID or BOT_OWNER_ID must be set".to_string(),
                ));
            }
        };

        let profile = Profile {
            first_name: var("BOT_FIRST_NAME").unwrap_or_default(),
            last_name: var("BOT_LAST_NAME").unwrap_or_default(),
            job_title: var("BOT_JOB_TITLE").unwrap_or_default(),
            company: var("BOT_COMPANY").unwrap_or_default(),
        };

        let keepalive_interval =
            Duration::from_secs(parse_number(&var, "KEEPALIVE_INTERVAL_SECS", 10)?);
        let settle_delay = Duration::from_millis(parse_number(&var, "SETTLE_DELAY_MS", 2000)?);
        let chunk_interval = Duration::from_millis(parse_number(&var, "CHUNK_INTERVAL_MS", 1500)?);
        if keepalive_interval.is_zero() || chunk_interval.is_zero() {
            return Err(BotError::Config(
                "KEEPALIVE_INTERVAL_SECS and CHUNK_INTERVAL_MS must be positive".to_string(),
            ));
        }

        let config = Self {
            discord_token,
            conversation,
            nick_name: var("BOT_NICK_NAME").unwrap_or_else(|| "Recorder".to_string()),
            profile,
            keepalive_interval,
            settle_delay,
            chunk_interval,
            recordings_dir: var("RECORDINGS_DIR")
                .map_or_else(|| PathBuf::from("recordings"), PathBuf::from),
        };

        info!("Configuration loaded successfully");
        debug!("Discord token length: {} characters", config.discord_token.len());
        debug!("Conversation: {:?}", config.conversation);
        debug!(
            "Keepalive: {:?}, settle delay: {:?}, chunk interval: {:?}",
            config.keepalive_interval, config.settle_delay, config.chunk_interval
        );
        debug!("Recordings directory: {}", config.recordings_dir.display());

        Ok(config)
    }
}

fn parse_number(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match var(key) {
        Some(value) => value.trim().parse().map_err(|e| {
            error!("Invalid {key} value {value:?}: {e}");
            BotError::Config(format!("{key} must be a whole number, got {value:?}"))
        }),
        None => Ok(default),
    }
}
