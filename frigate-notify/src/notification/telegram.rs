//! Telegram Bot API sink.
//!
//! Sends text via `sendMessage`, snapshots via `sendPhoto` and clips via
//! `sendVideo`. Media given as a URL is passed through for Telegram to fetch;
//! local files are uploaded as multipart. Handles 429 rate limits by
//! respecting the `parameters.retry_after` field returned in the JSON body.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::NotificationSink;
use crate::config::{ParseMode, TelegramConfig};
use crate::media::MediaRef;
use crate::render::{TELEGRAM_MESSAGE_LIMIT, truncate_message};
use crate::utils::http_client;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    username: Option<String>,
    first_name: String,
}

/// Request body, rebuilt for every attempt.
enum Payload {
    Json(Value),
    Upload {
        fields: Vec<(&'static str, String)>,
        file_field: &'static str,
        file_name: String,
        bytes: Vec<u8>,
    },
}

impl Payload {
    fn attach(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Payload::Json(body) => request.json(body),
            Payload::Upload {
                fields,
                file_field,
                file_name,
                bytes,
            } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(*name, value.clone());
                }
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                request.multipart(form.part(*file_field, part))
            }
        }
    }
}

/// Telegram notification sink.
pub struct TelegramSink {
    bot_token: String,
    parse_mode: ParseMode,
    api_base: String,
    client: Client,
}

impl TelegramSink {
    pub fn new(bot_token: impl Into<String>, parse_mode: ParseMode) -> Result<Self> {
        Ok(Self {
            bot_token: bot_token.into(),
            parse_mode,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: http_client::build_client()?,
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        Self::new(config.bot_token.clone(), config.parse_mode)
    }

    /// Point at a self-hosted Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Check the token with `getMe` and return the bot's display name.
    pub async fn verify(&self) -> Result<String> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("Telegram getMe failed: {}", e.without_url())))?;

        let status = response.status();
        let body: ApiResponse<BotUser> = response.json().await.map_err(|e| {
            Error::delivery(format!(
                "Telegram getMe returned {} with an unreadable body: {}",
                status,
                e.without_url()
            ))
        })?;

        match body.result {
            Some(user) if body.ok => Ok(user.username.unwrap_or(user.first_name)),
            _ => Err(Error::delivery(format!(
                "Telegram rejected the bot token: {} {}",
                status,
                body.description.unwrap_or_default()
            ))),
        }
    }

    fn text_payload(&self, chat_id: &str, text: &str) -> Payload {
        let mut body = json!({
            "chat_id": chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
        });
        if let Some(mode) = self.parse_mode.api_value() {
            body["parse_mode"] = json!(mode);
        }
        Payload::Json(body)
    }

    async fn media_payload(
        &self,
        chat_id: &str,
        field: &'static str,
        media: &MediaRef,
        extra: &[(&'static str, &str)],
    ) -> Result<Payload> {
        match media {
            MediaRef::Url(url) => {
                let mut body = json!({ "chat_id": chat_id });
                body[field] = json!(url);
                for (name, value) in extra {
                    body[*name] = json!(value);
                }
                Ok(Payload::Json(body))
            }
            MediaRef::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    Error::media(format!("cannot read {}: {}", path.display(), e))
                })?;
                let mut fields = vec![("chat_id", chat_id.to_string())];
                fields.extend(extra.iter().map(|(name, value)| (*name, value.to_string())));
                Ok(Payload::Upload {
                    fields,
                    file_field: field,
                    file_name: file_name(path, field),
                    bytes,
                })
            }
        }
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, method: &str, payload: &Payload) -> Result<()> {
        let url = self.method_url(method);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = payload
                .attach(self.client.post(&url))
                .send()
                .await
                .map_err(|e| {
                    Error::delivery(format!("Telegram {} request failed: {}", method, e.without_url()))
                })?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let body: Value = response.json().await.unwrap_or_default();
                let retry_after = retry_after(&body);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(format!(
                "Telegram {} failed: {} - {}",
                method,
                status,
                describe_error(&body)
            )));
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn sink_type(&self) -> &'static str {
        "telegram"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let payload = self.text_payload(chat_id, text);
        self.send_with_retry("sendMessage", &payload).await?;
        debug!("Telegram message sent to {}", chat_id);
        Ok(())
    }

    async fn send_image(&self, chat_id: &str, image: &MediaRef) -> Result<()> {
        let payload = self.media_payload(chat_id, "photo", image, &[]).await?;
        self.send_with_retry("sendPhoto", &payload).await?;
        debug!("Telegram photo sent to {}: {}", chat_id, image);
        Ok(())
    }

    async fn send_video(&self, chat_id: &str, video: &MediaRef) -> Result<()> {
        let payload = self
            .media_payload(chat_id, "video", video, &[("supports_streaming", "true")])
            .await?;
        self.send_with_retry("sendVideo", &payload).await?;
        debug!("Telegram video sent to {}: {}", chat_id, video);
        Ok(())
    }
}

fn retry_after(body: &Value) -> Option<Duration> {
    body.get("parameters")
        .and_then(|p| p.get("retry_after"))
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}

/// Prefer the API's `description` over the raw body.
fn describe_error(body: &str) -> String {
    serde_json::from_str::<ApiResponse<Value>>(body)
        .ok()
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.to_string())
}

fn file_name(path: &Path, field: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string())
}
