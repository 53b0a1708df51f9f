//! Detection events produced by the object detector.
//!
//! A [`DetectionEvent`] can only be built through [`DetectionEvent::new`] or
//! by deserializing a payload, and both paths run the same checks, so every
//! value in circulation satisfies the confidence and bounding-box invariants.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in image coordinates, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, ValidationError> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 >= x2 || y1 >= y2 {
            return Err(ValidationError::InvalidBoundingBox { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = ValidationError;

    fn try_from(coords: [f64; 4]) -> Result<Self, Self::Error> {
        let [x1, y1, x2, y2] = coords;
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// A single observation reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDetection")]
pub struct DetectionEvent {
    class_name: String,
    confidence: f64,
    bbox: BoundingBox,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_id: Option<u64>,
}

impl DetectionEvent {
    /// Checked factory enforcing every detection invariant.
    pub fn new(
        class_name: impl Into<String>,
        confidence: f64,
        bbox: BoundingBox,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let class_name = class_name.into();
        if class_name.trim().is_empty() {
            return Err(ValidationError::EmptyClassName);
        }
        validate_confidence(confidence)?;
        Ok(Self {
            class_name,
            confidence,
            bbox,
            timestamp,
            frame_id: None,
        })
    }

    pub fn with_frame_id(mut self, frame_id: u64) -> Self {
        self.frame_id = Some(frame_id);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn frame_id(&self) -> Option<u64> {
        self.frame_id
    }
}

/// Reject confidences outside `[0.0, 1.0]` (NaN included).
pub fn validate_confidence(confidence: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ValidationError::ConfidenceOutOfRange { value: confidence })
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Wire shape of a detection before validation.
#[derive(Debug, Deserialize)]
struct RawDetection {
    class_name: String,
    confidence: f64,
    bbox: BoundingBox,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    frame_id: Option<u64>,
}

impl TryFrom<RawDetection> for DetectionEvent {
    type Error = ValidationError;

    fn try_from(raw: RawDetection) -> Result<Self, Self::Error> {
        let timestamp = match raw.timestamp.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => Utc::now(),
        };
        let event = DetectionEvent::new(raw.class_name, raw.confidence, raw.bbox, timestamp)?;
        Ok(match raw.frame_id {
            Some(id) => event.with_frame_id(id),
            None => event,
        })
    }
}
