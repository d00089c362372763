//! Message template configuration.

use std::collections::HashMap;

use frigate_stream::Event;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "{label} detected on {camera}";
pub const DEFAULT_BODY: &str =
    "Zone: {zone}\nScore: {score}\nStarted: {start_time}\n{event_url}";

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_body() -> String {
    DEFAULT_BODY.to_string()
}

/// Title/body templates plus rendering overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    /// `field -> raw value -> display value`, e.g. `camera.front_door = "Front Door"`.
    #[serde(default)]
    pub display_names: HashMap<String, HashMap<String, String>>,
    /// Conditional overrides. The first matching entry is used.
    #[serde(default)]
    pub custom: Vec<CustomMessage>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            display_names: HashMap::new(),
            custom: Vec::new(),
        }
    }
}

impl MessagesConfig {
    /// First custom message whose conditions match `event`.
    pub fn custom_for(&self, event: &Event) -> Option<&CustomMessage> {
        self.custom.iter().find(|c| c.conditions.matches(event))
    }
}

/// Message override applied when its conditions match.
///
/// Without `title`/`body` the default templates are used with this entry's
/// styles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomMessage {
    #[serde(default)]
    pub conditions: MessageConditions,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Style per template field name.
    #[serde(default)]
    pub styles: HashMap<String, FieldStyle>,
}

/// Event attributes a custom message applies to. Unset attributes match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageConditions {
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sublabel: Option<String>,
}

impl MessageConditions {
    pub fn matches(&self, event: &Event) -> bool {
        fn check(expected: &Option<String>, actual: Option<&str>) -> bool {
            match expected {
                Some(expected) => actual == Some(expected.as_str()),
                None => true,
            }
        }

        check(&self.camera, Some(event.camera()))
            && check(&self.zone, event.zone())
            && check(&self.label, Some(event.label()))
            && check(&self.sublabel, event.sub_label())
    }
}

/// Text transforms applied to one field value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    /// Upper-case the whole value.
    #[serde(default)]
    pub caps: bool,
    /// Upper-case the first character.
    #[serde(default)]
    pub capitalize: bool,
    /// Prefix, separated by a space.
    #[serde(default)]
    pub emoji: Option<String>,
}
