//! Configuration for trinketbot.
//!
//! Everything is env-var driven, loaded with priority: explicit env vars >
//! `./.env` (via dotenvy, loaded early in startup) > built-in defaults.
//! The only required variable is `MARKETPLACE_TOKEN`; identifiers for the
//! forum and panel channels must also be present for the bot to do
//! anything useful.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const DEFAULT_COOLDOWN_DAYS: i64 = 14;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_WORKFLOW_TTL_SECS: u64 = 30 * 60;
const DEFAULT_EMBED_COLOR: u32 = 0xe0ad76;

/// Main configuration for the bot.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token used for both the gateway handshake and REST calls.
    pub token: SecretString,
    /// REST base URL, e.g. `https://discord.com/api/v10`.
    pub api_base_url: String,
    /// Gateway websocket URL used for the initial connect.
    pub gateway_url: String,
    /// Forum channel listings are posted to.
    pub forum_channel_id: String,
    /// Channel the listing panel message is posted to.
    pub panel_channel_id: String,
    /// Roles allowed to run `setup_marketplace` (besides administrators).
    pub admin_role_ids: Vec<String>,
    /// Curated tag allowlist. Empty means every catalog tag is offered.
    pub allowed_tag_ids: Vec<String>,
    /// Minimum days between two successful listings by the same user.
    pub cooldown_days: i64,
    /// Fixed delay before any reconnect attempt.
    pub reconnect_delay: Duration,
    /// Idle lifetime of an in-progress workflow before it is swept.
    pub workflow_ttl: Duration,
    /// Accent color for listing embeds.
    pub embed_color: u32,
    /// Directory the JSON document store writes to.
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            token: SecretString::from(required_env("MARKETPLACE_TOKEN")?),
            api_base_url: optional_env("MARKETPLACE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            gateway_url: optional_env("MARKETPLACE_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            forum_channel_id: required_env("MARKETPLACE_FORUM_ID")?,
            panel_channel_id: required_env("MARKETPLACE_PANEL_CHANNEL_ID")?,
            admin_role_ids: id_list(optional_env("MARKETPLACE_ADMIN_ROLE_IDS")),
            allowed_tag_ids: id_list(optional_env("MARKETPLACE_TAG_IDS")),
            cooldown_days: parse_i64(
                "MARKETPLACE_COOLDOWN_DAYS",
                optional_env("MARKETPLACE_COOLDOWN_DAYS"),
                DEFAULT_COOLDOWN_DAYS,
            )?,
            reconnect_delay: Duration::from_secs(parse_u64(
                "MARKETPLACE_RECONNECT_DELAY_SECS",
                optional_env("MARKETPLACE_RECONNECT_DELAY_SECS"),
                DEFAULT_RECONNECT_DELAY_SECS,
            )?),
            workflow_ttl: Duration::from_secs(parse_u64(
                "MARKETPLACE_WORKFLOW_TTL_SECS",
                optional_env("MARKETPLACE_WORKFLOW_TTL_SECS"),
                DEFAULT_WORKFLOW_TTL_SECS,
            )?),
            embed_color: parse_color(
                "MARKETPLACE_EMBED_COLOR",
                optional_env("MARKETPLACE_EMBED_COLOR"),
            )?,
            data_dir: optional_env("MARKETPLACE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
        })
    }
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn id_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_i64(key: &str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an integer, got '{value}'"),
        }),
    }
}

fn parse_u64(key: &str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got '{value}'"),
        }),
    }
}

fn parse_color(key: &str, raw: Option<String>) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(DEFAULT_EMBED_COLOR),
        Some(value) => {
            let digits = value.trim_start_matches("0x").trim_start_matches('#');
            u32::from_str_radix(digits, 16).map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a hex color like 'e0ad76', got '{value}'"),
            })
        }
    }
}
