//! Application configuration.
//!
//! Loaded once at startup from a TOML file, validated, and shared read-only
//! afterwards. Any validation failure is fatal.
//!
//! ```toml
//! time_format = "standard"
//! time_zone = "Europe/Berlin"
//!
//! [telegram]
//! bot_token = "123:abc"
//! chat_id = -1001234567890
//!
//! [frigate]
//! url = "http://frigate.lan:5000"
//! external_url = "https://frigate.example.com"
//! websocket_url = "ws://frigate.lan:5000/ws"
//!
//! [cameras.front_door]
//! labels = ["person"]
//! min_score = 0.7
//! ```

mod camera;
mod messages;

pub use camera::{CameraRule, ZoneRule};
pub use messages::{
    CustomMessage, DEFAULT_BODY, DEFAULT_TITLE, FieldStyle, MessageConditions, MessagesConfig,
};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable that overrides `telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "FRIGATE_NOTIFY_BOT_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Lower the default log level to `debug`.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub time_format: TimeFormat,
    /// IANA time zone used when rendering event times.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    pub telegram: TelegramConfig,
    pub frigate: FrigateConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub cameras: HashMap<String, CameraRule>,
    #[serde(default)]
    pub messages: MessagesConfig,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Config {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::parse(&content)?;
        config.apply_bot_token_override(std::env::var(BOT_TOKEN_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Replace the bot token when `token` is non-empty.
    pub fn apply_bot_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::config(format!(
                "telegram.bot_token is required (or set {})",
                BOT_TOKEN_ENV
            )));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(Error::config("telegram.chat_id is required"));
        }

        self.frigate.validate()?;
        self.dispatch.validate()?;

        if let TimeFormat::Custom(pattern) = &self.time_format {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(Error::config(format!(
                    "time_format {:?} is not a valid strftime pattern",
                    pattern
                )));
            }
        }
        self.tz()?;

        for (camera, rule) in &self.cameras {
            rule.validate(camera)?;
        }
        Ok(())
    }

    /// The configured time zone.
    pub fn tz(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| Error::config(format!("unknown time_zone {:?}", self.time_zone)))
    }
}

/// Chat ID as written in the config: Telegram ids are integers, channel
/// usernames are strings.
fn deserialize_chat_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChatId {
        Numeric(i64),
        Text(String),
    }

    Ok(match ChatId::deserialize(deserializer)? {
        ChatId::Numeric(id) => id.to_string(),
        ChatId::Text(id) => id,
    })
}

fn default_true() -> bool {
    true
}

/// Telegram bot settings.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default, deserialize_with = "deserialize_chat_id")]
    pub chat_id: String,
    #[serde(default)]
    pub parse_mode: ParseMode,
    /// Call `getMe` before starting and abort when it fails.
    #[serde(default = "default_true")]
    pub verify_on_startup: bool,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("parse_mode", &self.parse_mode)
            .field("verify_on_startup", &self.verify_on_startup)
            .finish()
    }
}

/// Message markup flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Html,
    Markdown,
    Plain,
}

impl ParseMode {
    /// Value for the Bot API `parse_mode` field.
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            ParseMode::Html => Some("HTML"),
            ParseMode::Markdown => Some("Markdown"),
            ParseMode::Plain => None,
        }
    }
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Frigate endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrigateConfig {
    /// Internal API base URL, used for downloads.
    #[serde(default)]
    pub url: String,
    /// Public base URL used in links. Defaults to `url`.
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub websocket_url: String,
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl FrigateConfig {
    /// Internal base URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Public base URL without a trailing slash.
    pub fn external_url(&self) -> &str {
        self.external_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.url)
            .trim_end_matches('/')
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::config("frigate.url is required"));
        }
        if self.websocket_url.trim().is_empty() {
            return Err(Error::config("frigate.websocket_url is required"));
        }

        check_url("frigate.url", &self.url, &["http", "https"])?;
        check_url("frigate.external_url", self.external_url(), &["http", "https"])?;
        check_url("frigate.websocket_url", &self.websocket_url, &["ws", "wss"])?;

        if self.reconnect_backoff_secs == 0 {
            return Err(Error::config("frigate.reconnect_backoff_secs must be at least 1"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::config("frigate.connect_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| Error::config(format!("{} {:?} is not a valid URL: {}", field, value, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(Error::config(format!(
            "{} must use one of {:?}, got {:?}",
            field,
            schemes,
            url.scheme()
        )));
    }
    Ok(())
}

/// How media is handed to the chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Send public URLs and let Telegram fetch them.
    #[default]
    Link,
    /// Download from the internal API and upload the file.
    Download,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    #[serde(default)]
    pub mode: MediaMode,
    /// Where downloaded media is stored. Defaults to the system temp directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl MediaConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_worker_pool_size() -> usize {
    10
}

fn default_task_queue_buffer_size() -> usize {
    100
}

fn default_send_timeout_secs() -> u64 {
    10
}

/// Worker pool tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_task_queue_buffer_size")]
    pub task_queue_buffer_size: usize,
    /// Upper bound for every individual send or media fetch.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            task_queue_buffer_size: default_task_queue_buffer_size(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(Error::config("dispatch.worker_pool_size must be at least 1"));
        }
        if self.task_queue_buffer_size == 0 {
            return Err(Error::config(
                "dispatch.task_queue_buffer_size must be at least 1",
            ));
        }
        if self.send_timeout_secs == 0 {
            return Err(Error::config("dispatch.send_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// How event times are formatted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TimeFormat {
    /// `%Y-%m-%d %H:%M:%S`
    #[default]
    Standard,
    /// RFC 3339
    Iso,
    /// Any other strftime pattern.
    Custom(String),
}

impl From<String> for TimeFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "standard" => TimeFormat::Standard,
            "iso" => TimeFormat::Iso,
            _ => TimeFormat::Custom(value),
        }
    }
}
