//! Notification text rendering.
//!
//! [`MessageRenderer::render`] turns an [`Event`] into a title and body using
//! the configured templates. Rendering never fails: unknown placeholders and
//! missing values become empty strings, and every substituted value is escaped
//! for the configured markup.

mod style;
mod template;

pub use style::escape;
pub use template::{expand, placeholders};

use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use frigate_stream::Event;
use tracing::warn;

use crate::Result;
use crate::config::{Config, FieldStyle, MessagesConfig, ParseMode, TimeFormat};
use crate::media::{MediaKind, event_media_url, event_review_url};

/// Telegram `sendMessage` text limit (UTF-8 characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Placeholder names bound from event fields.
pub const FIELDS: &[&str] = &[
    "id",
    "camera",
    "label",
    "sublabel",
    "zone",
    "score",
    "length",
    "severity",
    "start_time",
    "end_time",
    "event_url",
    "snapshot_url",
    "clip_url",
];

const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendered notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

impl RenderedMessage {
    /// Title and body separated by a blank line, within the Telegram limit.
    pub fn text(&self) -> String {
        let parts: Vec<&str> = [self.title.trim(), self.body.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        truncate_message(&parts.join("\n\n"), TELEGRAM_MESSAGE_LIMIT)
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

/// Truncate a message to fit within `limit` characters.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

/// Renders events with the configured templates.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    messages: MessagesConfig,
    time_format: TimeFormat,
    time_zone: Tz,
    mode: ParseMode,
    external_url: String,
}

impl MessageRenderer {
    pub fn new(
        messages: MessagesConfig,
        time_format: TimeFormat,
        time_zone: Tz,
        mode: ParseMode,
        external_url: impl Into<String>,
    ) -> Self {
        Self {
            messages,
            time_format,
            time_zone,
            mode,
            external_url: external_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let messages = &config.messages;
        let templates = [messages.title.as_str(), messages.body.as_str()]
            .into_iter()
            .chain(
                messages
                    .custom
                    .iter()
                    .flat_map(|c| [c.title.as_deref(), c.body.as_deref()])
                    .flatten(),
            );
        for template in templates {
            for name in template::placeholders(template) {
                if !FIELDS.contains(&name.as_str()) {
                    warn!(
                        "Template placeholder {{{}}} is not a known field and will render empty",
                        name
                    );
                }
            }
        }

        Ok(Self::new(
            config.messages.clone(),
            config.time_format.clone(),
            config.tz()?,
            config.telegram.parse_mode,
            config.frigate.external_url(),
        ))
    }

    pub fn render(&self, event: &Event) -> RenderedMessage {
        let custom = self.messages.custom_for(event);
        let empty = HashMap::new();
        let styles = custom.map(|c| &c.styles).unwrap_or(&empty);

        let title = custom
            .and_then(|c| c.title.as_deref())
            .unwrap_or(&self.messages.title);
        let body = custom
            .and_then(|c| c.body.as_deref())
            .unwrap_or(&self.messages.body);

        RenderedMessage {
            title: self.render_template(title, event, styles),
            body: self.render_template(body, event, styles),
        }
    }

    fn render_template(
        &self,
        template: &str,
        event: &Event,
        styles: &HashMap<String, FieldStyle>,
    ) -> String {
        template::expand(template, |name| {
            let raw = self.field(event, name)?;
            let display = self.display_name(name, raw);
            Some(style::apply(&display, styles.get(name), self.mode))
        })
    }

    /// Raw value of a template field.
    fn field(&self, event: &Event, name: &str) -> Option<String> {
        match name {
            "id" => Some(event.id().to_string()),
            "camera" => Some(event.camera().to_string()),
            "label" => Some(event.label().to_string()),
            "sublabel" => event.sub_label().map(str::to_string),
            "zone" => event.zone().map(str::to_string),
            "score" => Some(format!("{:.1}%", event.top_score() * 100.0)),
            "length" => event.length().map(|l| format!("{:.1}s", l)),
            "severity" => event.severity().map(str::to_string),
            "start_time" => Some(self.format_time(event.start_time())),
            "end_time" => event.end_time().map(|t| self.format_time(t)),
            "event_url" => Some(event_review_url(&self.external_url, event)),
            "snapshot_url" => Some(event_media_url(
                &self.external_url,
                event.id(),
                MediaKind::Snapshot,
            )),
            "clip_url" => Some(event_media_url(
                &self.external_url,
                event.id(),
                MediaKind::Clip,
            )),
            _ => None,
        }
    }

    fn display_name(&self, field: &str, raw: String) -> String {
        self.messages
            .display_names
            .get(field)
            .and_then(|names| names.get(&raw))
            .cloned()
            .unwrap_or(raw)
    }

    /// Format epoch seconds in the configured zone and format.
    fn format_time(&self, secs: f64) -> String {
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9) as u32).min(999_999_999);
        let Some(utc) = DateTime::from_timestamp(whole as i64, nanos) else {
            return String::new();
        };
        let local = utc.with_timezone(&self.time_zone);

        match &self.time_format {
            TimeFormat::Standard => local.format(STANDARD_TIME_FORMAT).to_string(),
            TimeFormat::Iso => local.to_rfc3339_opts(SecondsFormat::Secs, true),
            TimeFormat::Custom(pattern) => {
                let mut out = String::new();
                if write!(out, "{}", local.format(pattern)).is_err() {
                    out.clear();
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomMessage, MessageConditions};
    use proptest::prelude::*;

    // 2023-11-14 22:13:20 UTC
    const START: f64 = 1_700_000_000.0;

    fn renderer(messages: MessagesConfig) -> MessageRenderer {
        MessageRenderer::new(
            messages,
            TimeFormat::Standard,
            chrono_tz::UTC,
            ParseMode::Html,
            "https://nvr.example.com/",
        )
    }

    fn templates(title: &str, body: &str) -> MessagesConfig {
        MessagesConfig {
            title: title.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    fn event() -> Event {
        Event::builder("1700000000.5-abc", "front_door", "person")
            .zone("porch")
            .top_score(0.875)
            .start_time(START)
            .end_time(START + 12.5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_render_fields() {
        let r = renderer(templates(
            "{label} on {camera}",
            "{zone}|{score}|{length}|{start_time}|{end_time}|{id}",
        ));
        let message = r.render(&event());

        assert_eq!(message.title, "person on front_door");
        assert_eq!(
            message.body,
            "porch|87.5%|12.5s|2023-11-14 22:13:20|2023-11-14 22:13:32|1700000000.5-abc"
        );
    }

    #[test]
    fn test_missing_values_render_empty() {
        let event = Event::builder("1", "c", "l").start_time(START).build().unwrap();
        let r = renderer(templates("[{sublabel}][{zone}][{severity}]", "[{end_time}][{length}][{bogus}]"));
        let message = r.render(&event);
        assert_eq!(message.title, "[][][]");
        assert_eq!(message.body, "[][][]");
    }

    #[test]
    fn test_urls() {
        let r = renderer(templates("{snapshot_url}", "{clip_url}"));
        let message = r.render(&event());
        assert_eq!(
            message.title,
            "https://nvr.example.com/api/events/1700000000.5-abc/snapshot.jpg"
        );
        assert_eq!(
            message.body,
            "https://nvr.example.com/api/events/1700000000.5-abc/clip.mp4"
        );

        let r = renderer(templates("{event_url}", ""));
        let url = r.render(&event()).title;
        assert!(url.starts_with("https://nvr.example.com/events?"));
        assert!(url.contains("cameras=front_door"));
        assert!(url.contains("zones=porch"));
        assert!(url.contains("&amp;"), "URL must be HTML-escaped: {url}");
    }

    #[test]
    fn test_time_formats_and_zone() {
        let mut r = renderer(templates("{start_time}", ""));
        r.time_format = TimeFormat::Iso;
        assert_eq!(r.render(&event()).title, "2023-11-14T22:13:20Z");

        r.time_format = TimeFormat::Custom("%H:%M".to_string());
        r.time_zone = chrono_tz::Europe::Berlin;
        assert_eq!(r.render(&event()).title, "23:13");

        r.time_zone = chrono_tz::America::New_York;
        r.time_format = TimeFormat::Iso;
        assert_eq!(r.render(&event()).title, "2023-11-14T17:13:20-05:00");
    }

    #[test]
    fn test_values_are_escaped() {
        let event = Event::builder("1", "<script>", "a&b")
            .start_time(START)
            .build()
            .unwrap();
        let r = renderer(templates("<b>{camera}</b> {label}", ""));
        assert_eq!(r.render(&event).title, "<b>&lt;script&gt;</b> a&amp;b");
    }

    #[test]
    fn test_display_names() {
        let mut messages = templates("{camera}: {label}", "");
        messages.display_names.insert(
            "camera".to_string(),
            HashMap::from([("front_door".to_string(), "Front Door".to_string())]),
        );
        messages.display_names.insert(
            "label".to_string(),
            HashMap::from([("car".to_string(), "Vehicle".to_string())]),
        );
        assert_eq!(renderer(messages).render(&event()).title, "Front Door: person");
    }

    #[test]
    fn test_custom_message_first_match_wins() {
        let mut messages = templates("default {label}", "default body");
        messages.custom = vec![
            CustomMessage {
                conditions: MessageConditions {
                    label: Some("car".to_string()),
                    ..Default::default()
                },
                title: Some("car!".to_string()),
                ..Default::default()
            },
            CustomMessage {
                conditions: MessageConditions {
                    zone: Some("porch".to_string()),
                    ..Default::default()
                },
                title: Some("Someone at the {zone}".to_string()),
                ..Default::default()
            },
            CustomMessage {
                conditions: MessageConditions::default(),
                title: Some("never".to_string()),
                ..Default::default()
            },
        ];

        let message = renderer(messages).render(&event());
        assert_eq!(message.title, "Someone at the porch");
        assert_eq!(message.body, "default body");
    }

    #[test]
    fn test_custom_message_styles_with_default_templates() {
        let mut messages = templates("{label} on {camera}", "");
        messages.custom = vec![CustomMessage {
            conditions: MessageConditions {
                camera: Some("front_door".to_string()),
                ..Default::default()
            },
            styles: HashMap::from([(
                "label".to_string(),
                FieldStyle {
                    bold: true,
                    capitalize: true,
                    emoji: Some("🚶".to_string()),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        }];

        let message = renderer(messages).render(&event());
        assert_eq!(message.title, "🚶 <b>Person</b> on front_door");
    }

    #[test]
    fn test_text_joins_and_skips_empty_parts() {
        let message = RenderedMessage {
            title: "Title".to_string(),
            body: "Body".to_string(),
        };
        assert_eq!(message.text(), "Title\n\nBody");

        let message = RenderedMessage {
            title: String::new(),
            body: "Body".to_string(),
        };
        assert_eq!(message.text(), "Body");
        assert!(RenderedMessage::default().is_empty());
    }

    #[test]
    fn test_truncate_message() {
        let short = "hello";
        assert_eq!(truncate_message(short, 100), "hello");

        let long: String = "a".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("[truncated]"));

        let message = RenderedMessage {
            title: "t".to_string(),
            body: "é".repeat(5000),
        };
        assert!(message.text().chars().count() <= TELEGRAM_MESSAGE_LIMIT);
    }

    proptest! {
        #[test]
        fn test_no_known_placeholder_survives(
            camera in "[a-z_]{1,12}",
            label in "[a-z]{1,10}",
            zone in proptest::option::of("[a-z]{1,8}"),
            score in 0.0f64..=1.0,
            length in proptest::option::of(0.0f64..3600.0),
            prefix in "[A-Za-z ]{0,10}",
        ) {
            let mut builder = Event::builder("ev", camera, label)
                .top_score(score)
                .start_time(START);
            if let Some(zone) = zone {
                builder = builder.zone(zone);
            }
            if let Some(length) = length {
                builder = builder.end_time(START + length);
            }
            let event = builder.build().unwrap();

            let all: String = FIELDS.iter().map(|f| format!("{{{f}}}")).collect::<Vec<_>>().join(" ");
            let r = renderer(templates(&format!("{prefix}{all}"), &all));
            let message = r.render(&event);

            for field in FIELDS {
                let token = format!("{{{field}}}");
                prop_assert!(!message.title.contains(&token));
                prop_assert!(!message.body.contains(&token));
            }
            prop_assert!(!message.title.is_empty());
        }

        #[test]
        fn test_rendering_literal_text_is_identity(text in "[^{}]{0,40}") {
            let r = MessageRenderer::new(
                templates(&text, ""),
                TimeFormat::Standard,
                chrono_tz::UTC,
                ParseMode::Plain,
                "http://x",
            );
            prop_assert_eq!(r.render(&event()).title, text);
        }
    }
}
