use std::collections::HashMap;
use std::sync::Arc;

use frigate_stream::Event;

use super::Rejection;
use crate::config::CameraRule;

/// Camera rule with the matching zone override folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRule {
    pub labels: Vec<String>,
    pub sublabels: Vec<String>,
    pub min_score: f64,
    pub max_score: Option<f64>,
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub snapshot: bool,
    pub clip: bool,
    /// Zone whose override was applied.
    pub zone: Option<String>,
}

impl EffectiveRule {
    /// Merge the override for `zone` (if any) over `rule`. Zone values win.
    pub fn resolve(rule: &CameraRule, zone: Option<&str>) -> Self {
        let mut effective = Self {
            labels: rule.labels.clone(),
            sublabels: rule.sublabels.clone(),
            min_score: rule.min_score.unwrap_or(0.0),
            max_score: rule.max_score,
            min_length: rule.min_length,
            max_length: rule.max_length,
            snapshot: rule.snapshot,
            clip: rule.clip,
            zone: None,
        };

        let Some((name, zone_rule)) = zone.and_then(|z| rule.zones.get_key_value(z)) else {
            return effective;
        };

        if let Some(labels) = &zone_rule.labels {
            effective.labels = labels.clone();
        }
        if let Some(sublabels) = &zone_rule.sublabels {
            effective.sublabels = sublabels.clone();
        }
        if let Some(min) = zone_rule.min_score {
            effective.min_score = min;
        }
        if zone_rule.max_score.is_some() {
            effective.max_score = zone_rule.max_score;
        }
        if zone_rule.min_length.is_some() {
            effective.min_length = zone_rule.min_length;
        }
        if zone_rule.max_length.is_some() {
            effective.max_length = zone_rule.max_length;
        }
        if let Some(snapshot) = zone_rule.snapshot {
            effective.snapshot = snapshot;
        }
        if let Some(clip) = zone_rule.clip {
            effective.clip = clip;
        }
        effective.zone = Some(name.clone());
        effective
    }

    /// Apply the filters in order: label, sublabel, score, length.
    pub fn check(&self, event: &Event) -> Result<(), Rejection> {
        if !self.labels.is_empty() && !self.labels.iter().any(|l| l == event.label()) {
            return Err(Rejection::LabelNotAllowed {
                label: event.label().to_string(),
            });
        }

        if !self.sublabels.is_empty() {
            let allowed = event
                .sub_label()
                .is_some_and(|s| self.sublabels.iter().any(|allowed| allowed == s));
            if !allowed {
                return Err(Rejection::SubLabelNotAllowed {
                    sub_label: event.sub_label().map(str::to_string),
                });
            }
        }

        let score = event.top_score();
        if score < self.min_score {
            return Err(Rejection::ScoreBelowMinimum {
                score,
                min: self.min_score,
            });
        }
        if let Some(max) = self.max_score {
            if score > max {
                return Err(Rejection::ScoreAboveMaximum { score, max });
            }
        }

        // In-progress events have no length yet.
        if let Some(length) = event.length() {
            if let Some(min) = self.min_length {
                if length < min {
                    return Err(Rejection::TooShort { length, min });
                }
            }
            if let Some(max) = self.max_length {
                if length > max {
                    return Err(Rejection::TooLong { length, max });
                }
            }
        }

        Ok(())
    }
}

/// Looks up and applies camera rules.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    cameras: Arc<HashMap<String, CameraRule>>,
}

impl RuleEvaluator {
    pub fn new(cameras: HashMap<String, CameraRule>) -> Self {
        Self {
            cameras: Arc::new(cameras),
        }
    }

    /// Decide whether `event` should be forwarded.
    ///
    /// On success the returned rule carries the media policy to apply.
    pub fn evaluate(&self, event: &Event) -> Result<EffectiveRule, Rejection> {
        let rule = self
            .cameras
            .get(event.camera())
            .ok_or_else(|| Rejection::UnconfiguredCamera {
                camera: event.camera().to_string(),
            })?;

        let effective = EffectiveRule::resolve(rule, event.zone());
        effective.check(event)?;
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneRule;

    fn evaluator(camera: &str, rule: CameraRule) -> RuleEvaluator {
        RuleEvaluator::new(HashMap::from([(camera.to_string(), rule)]))
    }

    fn event(label: &str, score: f64) -> frigate_stream::EventBuilder {
        Event::builder("1", "front", label)
            .top_score(score)
            .start_time(100.0)
    }

    #[test]
    fn test_unconfigured_camera_is_rejected() {
        let rules = evaluator("back", CameraRule::default());
        let result = rules.evaluate(&event("person", 0.9).build().unwrap());
        assert_eq!(
            result,
            Err(Rejection::UnconfiguredCamera {
                camera: "front".to_string()
            })
        );
    }

    #[test]
    fn test_min_score_boundary() {
        let rules = evaluator(
            "front",
            CameraRule {
                min_score: Some(0.7),
                ..Default::default()
            },
        );

        let low = event("person", 0.65).build().unwrap();
        assert!(matches!(
            rules.evaluate(&low),
            Err(Rejection::ScoreBelowMinimum { .. })
        ));

        let high = event("person", 0.75).build().unwrap();
        assert!(rules.evaluate(&high).is_ok());

        let exact = event("person", 0.7).build().unwrap();
        assert!(rules.evaluate(&exact).is_ok());
    }

    #[test]
    fn test_max_score() {
        let rules = evaluator(
            "front",
            CameraRule {
                max_score: Some(0.8),
                ..Default::default()
            },
        );
        assert!(matches!(
            rules.evaluate(&event("person", 0.95).build().unwrap()),
            Err(Rejection::ScoreAboveMaximum { .. })
        ));
        assert!(rules.evaluate(&event("person", 0.8).build().unwrap()).is_ok());
    }

    #[test]
    fn test_label_filter() {
        let rules = evaluator(
            "front",
            CameraRule {
                labels: vec!["person".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(
            rules.evaluate(&event("car", 0.9).build().unwrap()),
            Err(Rejection::LabelNotAllowed {
                label: "car".to_string()
            })
        );
        assert!(rules.evaluate(&event("person", 0.9).build().unwrap()).is_ok());
    }

    #[test]
    fn test_empty_labels_allow_everything() {
        let rules = evaluator("front", CameraRule::default());
        assert!(rules.evaluate(&event("raccoon", 0.1).build().unwrap()).is_ok());
    }

    #[test]
    fn test_sublabel_filter() {
        let rules = evaluator(
            "front",
            CameraRule {
                sublabels: vec!["alice".to_string()],
                ..Default::default()
            },
        );

        let alice = event("person", 0.9).sub_label("alice").build().unwrap();
        assert!(rules.evaluate(&alice).is_ok());

        let bob = event("person", 0.9).sub_label("bob").build().unwrap();
        assert!(matches!(
            rules.evaluate(&bob),
            Err(Rejection::SubLabelNotAllowed { sub_label: Some(_) })
        ));

        let unknown = event("person", 0.9).build().unwrap();
        assert_eq!(
            rules.evaluate(&unknown),
            Err(Rejection::SubLabelNotAllowed { sub_label: None })
        );
    }

    #[test]
    fn test_zone_override_only_applies_to_its_zone() {
        let mut rule = CameraRule {
            min_score: Some(0.5),
            ..Default::default()
        };
        rule.zones.insert(
            "driveway".to_string(),
            ZoneRule {
                min_score: Some(0.9),
                ..Default::default()
            },
        );
        let rules = evaluator("front", rule);

        let in_driveway = event("car", 0.7).zone("driveway").build().unwrap();
        assert!(matches!(
            rules.evaluate(&in_driveway),
            Err(Rejection::ScoreBelowMinimum { min, .. }) if min == 0.9
        ));

        let on_porch = event("car", 0.7).zone("porch").build().unwrap();
        let effective = rules.evaluate(&on_porch).unwrap();
        assert_eq!(effective.min_score, 0.5);
        assert!(effective.zone.is_none());

        let no_zone = event("car", 0.7).build().unwrap();
        assert!(rules.evaluate(&no_zone).is_ok());

        let confident = event("car", 0.95).zone("driveway").build().unwrap();
        let effective = rules.evaluate(&confident).unwrap();
        assert_eq!(effective.zone.as_deref(), Some("driveway"));
    }

    #[test]
    fn test_zone_override_keeps_unset_camera_values() {
        let mut rule = CameraRule {
            labels: vec!["person".to_string()],
            max_score: Some(0.99),
            clip: false,
            ..Default::default()
        };
        rule.zones.insert(
            "yard".to_string(),
            ZoneRule {
                sublabels: Some(vec!["alice".to_string()]),
                ..Default::default()
            },
        );

        let effective = EffectiveRule::resolve(&rule, Some("yard"));
        assert_eq!(effective.labels, vec!["person".to_string()]);
        assert_eq!(effective.sublabels, vec!["alice".to_string()]);
        assert_eq!(effective.max_score, Some(0.99));
        assert!(effective.snapshot);
        assert!(!effective.clip);
    }

    #[test]
    fn test_zone_overrides_media_policy() {
        let mut rule = CameraRule {
            clip: false,
            ..Default::default()
        };
        rule.zones.insert(
            "driveway".to_string(),
            ZoneRule {
                snapshot: Some(false),
                clip: Some(true),
                ..Default::default()
            },
        );

        let in_zone = EffectiveRule::resolve(&rule, Some("driveway"));
        assert!(!in_zone.snapshot);
        assert!(in_zone.clip);

        let elsewhere = EffectiveRule::resolve(&rule, Some("porch"));
        assert!(elsewhere.snapshot);
        assert!(!elsewhere.clip);
    }

    #[test]
    fn test_length_bounds() {
        let rules = evaluator(
            "front",
            CameraRule {
                min_length: Some(2.0),
                max_length: Some(60.0),
                ..Default::default()
            },
        );

        let short = event("person", 0.9).end_time(101.0).build().unwrap();
        assert!(matches!(rules.evaluate(&short), Err(Rejection::TooShort { .. })));

        let long = event("person", 0.9).end_time(200.0).build().unwrap();
        assert!(matches!(rules.evaluate(&long), Err(Rejection::TooLong { .. })));

        let ok = event("person", 0.9).end_time(110.0).build().unwrap();
        assert!(rules.evaluate(&ok).is_ok());

        let in_progress = event("person", 0.9).build().unwrap();
        assert!(rules.evaluate(&in_progress).is_ok());
    }

    #[test]
    fn test_rejection_display() {
        let rejection = Rejection::ScoreBelowMinimum {
            score: 0.65,
            min: 0.7,
        };
        assert_eq!(rejection.to_string(), "score 0.65 is below the minimum 0.70");
    }
}
