//! Per-camera filter rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_true() -> bool {
    true
}

/// Filter rule for one camera.
///
/// An empty `labels` list allows every label. An empty `sublabels` list
/// disables sublabel filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraRule {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub sublabels: Vec<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    /// Minimum event length in seconds.
    #[serde(default)]
    pub min_length: Option<f64>,
    /// Maximum event length in seconds.
    #[serde(default)]
    pub max_length: Option<f64>,
    /// Attach the snapshot when the event has one.
    #[serde(default = "default_true")]
    pub snapshot: bool,
    /// Attach the clip when the event has one.
    #[serde(default = "default_true")]
    pub clip: bool,
    /// Overrides keyed by zone name.
    #[serde(default)]
    pub zones: HashMap<String, ZoneRule>,
}

impl Default for CameraRule {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            sublabels: Vec::new(),
            min_score: None,
            max_score: None,
            min_length: None,
            max_length: None,
            snapshot: true,
            clip: true,
            zones: HashMap::new(),
        }
    }
}

/// Zone-scoped override. Every field that is set replaces the camera value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneRule {
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub sublabels: Option<Vec<String>>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub min_length: Option<f64>,
    #[serde(default)]
    pub max_length: Option<f64>,
    #[serde(default)]
    pub snapshot: Option<bool>,
    #[serde(default)]
    pub clip: Option<bool>,
}

impl CameraRule {
    pub(crate) fn validate(&self, camera: &str) -> Result<()> {
        let scope = format!("cameras.{}", camera);
        check_bounds(&scope, self.min_score, self.max_score, self.min_length, self.max_length)?;

        // Zone bounds are checked as merged over the camera's.
        for (zone, rule) in &self.zones {
            let scope = format!("cameras.{}.zones.{}", camera, zone);
            check_bounds(
                &scope,
                rule.min_score.or(self.min_score),
                rule.max_score.or(self.max_score),
                rule.min_length.or(self.min_length),
                rule.max_length.or(self.max_length),
            )?;
        }
        Ok(())
    }
}

fn check_bounds(
    scope: &str,
    min_score: Option<f64>,
    max_score: Option<f64>,
    min_length: Option<f64>,
    max_length: Option<f64>,
) -> Result<()> {
    for (name, value) in [("min_score", min_score), ("max_score", max_score)] {
        if let Some(v) = value {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(Error::config(format!(
                    "{}.{} must be within [0, 1], got {}",
                    scope, name, v
                )));
            }
        }
    }
    if let (Some(min), Some(max)) = (min_score, max_score) {
        if min > max {
            return Err(Error::config(format!(
                "{}: min_score {} is greater than max_score {}",
                scope, min, max
            )));
        }
    }

    for (name, value) in [("min_length", min_length), ("max_length", max_length)] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::config(format!(
                    "{}.{} must be a non-negative number of seconds, got {}",
                    scope, name, v
                )));
            }
        }
    }
    if let (Some(min), Some(max)) = (min_length, max_length) {
        if min > max {
            return Err(Error::config(format!(
                "{}: min_length {} is greater than max_length {}",
                scope, min, max
            )));
        }
    }
    Ok(())
}
