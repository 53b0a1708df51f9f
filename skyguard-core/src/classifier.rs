//! Threat classification: confidence bands to threat levels to actions.

use crate::detection::{DetectionEvent, validate_confidence};
use crate::error::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};

/// Ordered severity of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    /// The response action mandated for this level.
    pub fn action(self) -> ResponseAction {
        match self {
            ThreatLevel::High => ResponseAction::ActivateCountermeasure,
            ThreatLevel::Medium => ResponseAction::EscalateAlert,
            ThreatLevel::Low => ResponseAction::LogDetection,
            ThreatLevel::None => ResponseAction::Monitor,
        }
    }

    pub fn escalates(self) -> bool {
        self >= ThreatLevel::Medium
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatLevel::None => write!(f, "NONE"),
            ThreatLevel::Low => write!(f, "LOW"),
            ThreatLevel::Medium => write!(f, "MEDIUM"),
            ThreatLevel::High => write!(f, "HIGH"),
        }
    }
}

/// What the response service does about a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseAction {
    Monitor,
    LogDetection,
    EscalateAlert,
    ActivateCountermeasure,
}

impl std::fmt::Display for ResponseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseAction::Monitor => write!(f, "MONITOR"),
            ResponseAction::LogDetection => write!(f, "LOG_DETECTION"),
            ResponseAction::EscalateAlert => write!(f, "ESCALATE_ALERT"),
            ResponseAction::ActivateCountermeasure => write!(f, "ACTIVATE_COUNTERMEASURE"),
        }
    }
}

/// Classification outcome for one detection.
///
/// Only constructible from a level, so `escalate` always agrees with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreatEvaluation {
    level: ThreatLevel,
    action: ResponseAction,
    escalate: bool,
}

impl ThreatEvaluation {
    pub fn for_level(level: ThreatLevel) -> Self {
        Self {
            level,
            action: level.action(),
            escalate: level.escalates(),
        }
    }

    pub fn level(&self) -> ThreatLevel {
        self.level
    }

    pub fn action(&self) -> ResponseAction {
        self.action
    }

    pub fn escalate(&self) -> bool {
        self.escalate
    }
}

/// Lower bounds of the LOW, MEDIUM and HIGH confidence bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for ThreatThresholds {
    fn default() -> Self {
        Self {
            low: 0.75,
            medium: 0.80,
            high: 0.85,
        }
    }
}

impl ThreatThresholds {
    /// Check `0 <= low <= medium <= high <= 1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = [self.low, self.medium, self.high]
            .iter()
            .all(|t| (0.0..=1.0).contains(t));
        if in_range && self.low <= self.medium && self.medium <= self.high {
            Ok(())
        } else {
            Err(ConfigError::ThresholdOrder {
                low: self.low,
                medium: self.medium,
                high: self.high,
            })
        }
    }
}

/// Pure confidence-band classifier.
#[derive(Debug, Clone, Default)]
pub struct ThreatClassifier {
    thresholds: ThreatThresholds,
}

impl ThreatClassifier {
    pub fn new(thresholds: ThreatThresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &ThreatThresholds {
        &self.thresholds
    }

    /// Map a confidence to its threat level.
    pub fn classify(&self, confidence: f64) -> Result<ThreatLevel, ValidationError> {
        validate_confidence(confidence)?;
        Ok(self.band(confidence))
    }

    /// Classify a detection and derive its action.
    pub fn evaluate(&self, event: &DetectionEvent) -> ThreatEvaluation {
        // DetectionEvent guarantees an in-range confidence.
        ThreatEvaluation::for_level(self.band(event.confidence()))
    }

    fn band(&self, confidence: f64) -> ThreatLevel {
        let t = &self.thresholds;
        if confidence >= t.high {
            ThreatLevel::High
        } else if confidence >= t.medium {
            ThreatLevel::Medium
        } else if confidence >= t.low {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        }
    }
}
