//! Per-event filtering.
//!
//! [`RuleEvaluator`] decides whether an event is worth a notification. It is
//! pure: the same event and configuration always give the same answer.

mod evaluator;

pub use evaluator::{EffectiveRule, RuleEvaluator};

use std::fmt;

/// Why an event was not forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UnconfiguredCamera { camera: String },
    LabelNotAllowed { label: String },
    SubLabelNotAllowed { sub_label: Option<String> },
    ScoreBelowMinimum { score: f64, min: f64 },
    ScoreAboveMaximum { score: f64, max: f64 },
    TooShort { length: f64, min: f64 },
    TooLong { length: f64, max: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnconfiguredCamera { camera } => {
                write!(f, "camera {} is not configured", camera)
            }
            Rejection::LabelNotAllowed { label } => write!(f, "label {} is not allowed", label),
            Rejection::SubLabelNotAllowed { sub_label: Some(s) } => {
                write!(f, "sublabel {} is not allowed", s)
            }
            Rejection::SubLabelNotAllowed { sub_label: None } => {
                write!(f, "event has no sublabel but a sublabel filter is set")
            }
            Rejection::ScoreBelowMinimum { score, min } => {
                write!(f, "score {:.2} is below the minimum {:.2}", score, min)
            }
            Rejection::ScoreAboveMaximum { score, max } => {
                write!(f, "score {:.2} is above the maximum {:.2}", score, max)
            }
            Rejection::TooShort { length, min } => {
                write!(f, "length {:.1}s is shorter than {:.1}s", length, min)
            }
            Rejection::TooLong { length, max } => {
                write!(f, "length {:.1}s is longer than {:.1}s", length, max)
            }
        }
    }
}
