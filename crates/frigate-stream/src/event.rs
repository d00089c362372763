//! Detection event model.
//!
//! [`EventRecord`] is the wire shape published by the monitoring backend.
//! [`Event`] is the validated, immutable in-memory form handed to the dispatch
//! pipeline. The conversion between the two is the only place where payload
//! invariants are checked.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// A single detection event.
///
/// Constructed once (by decoding an [`EventRecord`] or through [`Event::builder`])
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    id: String,
    camera: String,
    label: String,
    sub_label: Option<String>,
    zone: Option<String>,
    top_score: f64,
    start_time: f64,
    end_time: Option<f64>,
    has_snapshot: bool,
    has_clip: bool,
    severity: Option<String>,
    reviewed: Option<bool>,
}

impl Event {
    /// Start building an event with the required identity fields.
    pub fn builder(
        id: impl Into<String>,
        camera: impl Into<String>,
        label: impl Into<String>,
    ) -> EventBuilder {
        EventBuilder::new(id, camera, label)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn sub_label(&self) -> Option<&str> {
        self.sub_label.as_deref()
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// Highest confidence reached by the detection, in `[0, 1]`.
    pub fn top_score(&self) -> f64 {
        self.top_score
    }

    /// Start of the event in seconds since the Unix epoch.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// End of the event, `None` while the detection is still in progress.
    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Event duration in seconds, when the end time is known.
    pub fn length(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn has_snapshot(&self) -> bool {
        self.has_snapshot
    }

    pub fn has_clip(&self) -> bool {
        self.has_clip
    }

    pub fn severity(&self) -> Option<&str> {
        self.severity.as_deref()
    }

    pub fn reviewed(&self) -> Option<bool> {
        self.reviewed
    }

    fn validate(self) -> Result<Self> {
        if self.id.trim().is_empty() {
            return Err(StreamError::invalid_event("event id is empty"));
        }
        if self.camera.trim().is_empty() {
            return Err(StreamError::invalid_event(format!(
                "event {} has an empty camera",
                self.id
            )));
        }
        if self.label.trim().is_empty() {
            return Err(StreamError::invalid_event(format!(
                "event {} has an empty label",
                self.id
            )));
        }
        if !self.top_score.is_finite() || !(0.0..=1.0).contains(&self.top_score) {
            return Err(StreamError::invalid_event(format!(
                "event {} has score {} outside [0, 1]",
                self.id, self.top_score
            )));
        }
        if !self.start_time.is_finite() {
            return Err(StreamError::invalid_event(format!(
                "event {} has a non-finite start time",
                self.id
            )));
        }
        if let Some(end) = self.end_time {
            if !end.is_finite() || end < self.start_time {
                return Err(StreamError::invalid_event(format!(
                    "event {} ends ({}) before it starts ({})",
                    self.id, end, self.start_time
                )));
            }
        }
        Ok(self)
    }
}

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    fn new(id: impl Into<String>, camera: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            event: Event {
                id: id.into(),
                camera: camera.into(),
                label: label.into(),
                sub_label: None,
                zone: None,
                top_score: 0.0,
                start_time: 0.0,
                end_time: None,
                has_snapshot: false,
                has_clip: false,
                severity: None,
                reviewed: None,
            },
        }
    }

    pub fn sub_label(mut self, sub_label: impl Into<String>) -> Self {
        self.event.sub_label = Some(sub_label.into());
        self
    }

    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.event.zone = Some(zone.into());
        self
    }

    pub fn top_score(mut self, score: f64) -> Self {
        self.event.top_score = score;
        self
    }

    pub fn start_time(mut self, start_time: f64) -> Self {
        self.event.start_time = start_time;
        self
    }

    pub fn end_time(mut self, end_time: f64) -> Self {
        self.event.end_time = Some(end_time);
        self
    }

    pub fn snapshot(mut self, has_snapshot: bool) -> Self {
        self.event.has_snapshot = has_snapshot;
        self
    }

    pub fn clip(mut self, has_clip: bool) -> Self {
        self.event.has_clip = has_clip;
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.event.severity = Some(severity.into());
        self
    }

    pub fn reviewed(mut self, reviewed: bool) -> Self {
        self.event.reviewed = Some(reviewed);
        self
    }

    /// Validate and build the event.
    pub fn build(self) -> Result<Event> {
        self.event.validate()
    }
}

/// Secondary classifier as published on the wire.
///
/// Older backends send a bare string, newer ones a `[name, score]` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SubLabelRecord {
    Name(String),
    Scored(String, f64),
}

impl SubLabelRecord {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) | Self::Scored(name, _) => name,
        }
    }
}

/// Event payload as carried in the `after` field of a stream message.
///
/// Fields not declared here are ignored. Declared fields with the wrong JSON
/// type fail the decode.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub camera: String,
    pub label: String,
    #[serde(default)]
    pub sub_label: Option<SubLabelRecord>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub current_zones: Option<Vec<String>>,
    #[serde(default)]
    pub entered_zones: Option<Vec<String>>,
    #[serde(default)]
    pub top_score: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub has_snapshot: bool,
    #[serde(default)]
    pub has_clip: bool,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub reviewed: Option<bool>,
}

impl TryFrom<EventRecord> for Event {
    type Error = StreamError;

    fn try_from(record: EventRecord) -> Result<Self> {
        let zone = record
            .zone
            .filter(|z| !z.is_empty())
            .or_else(|| first_zone(record.current_zones))
            .or_else(|| first_zone(record.entered_zones));

        let sub_label = record
            .sub_label
            .map(SubLabelRecord::into_name)
            .filter(|s| !s.is_empty());

        Event {
            id: record.id,
            camera: record.camera,
            label: record.label,
            sub_label,
            zone,
            top_score: record.top_score.or(record.score).unwrap_or(0.0),
            start_time: record.start_time,
            end_time: record.end_time,
            has_snapshot: record.has_snapshot,
            has_clip: record.has_clip,
            severity: record.severity.filter(|s| !s.is_empty()),
            reviewed: record.reviewed,
        }
        .validate()
    }
}

fn first_zone(zones: Option<Vec<String>>) -> Option<String> {
    zones?.into_iter().find(|z| !z.is_empty())
}
