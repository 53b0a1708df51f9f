//! Append-only in-memory audit trail of confirmed threats.
//!
//! All mutation goes through a single mutex, so concurrent incidents never
//! lose or duplicate entries. Nothing is persisted: the log lives for the
//! process lifetime only.

use crate::classifier::{ResponseAction, ThreatLevel};
use crate::detection::DetectionEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Result of the countermeasure phase for one incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CountermeasureOutcome {
    Activated,
    Failed,
    Skipped,
}

/// Result of the notification phase for one incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertOutcome {
    Sent,
    Failed,
    Skipped,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub detection: DetectionEvent,
    pub threat_level: ThreatLevel,
    pub action: ResponseAction,
    pub jammer: CountermeasureOutcome,
    pub email_alert: AlertOutcome,
}

/// Entry contents before the log assigns an id.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub timestamp: DateTime<Utc>,
    pub detection: DetectionEvent,
    pub threat_level: ThreatLevel,
    pub action: ResponseAction,
    pub jammer: CountermeasureOutcome,
    pub email_alert: AlertOutcome,
}

#[derive(Debug, Default)]
pub struct IncidentLog {
    entries: Mutex<Vec<IncidentEntry>>,
}

impl IncidentLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<IncidentEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an incident, assigning `max(id) + 1` (1 when empty).
    pub fn append(&self, incident: NewIncident) -> IncidentEntry {
        let mut entries = self.lock();
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let entry = IncidentEntry {
            id,
            timestamp: incident.timestamp,
            detection: incident.detection,
            threat_level: incident.threat_level,
            action: incident.action,
            jammer: incident.jammer,
            email_alert: incident.email_alert,
        };
        entries.push(entry.clone());
        entry
    }

    /// Count and a snapshot of all entries in insertion order.
    pub fn list(&self) -> (usize, Vec<IncidentEntry>) {
        let entries = self.lock();
        (entries.len(), entries.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.lock()).len();
        info!(removed, "Incident log cleared");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use std::sync::Arc;

    fn incident(confidence: f64) -> NewIncident {
        let detection = DetectionEvent::new(
            "drone",
            confidence,
            BoundingBox::new(150.0, 100.0, 450.0, 400.0).unwrap(),
            Utc::now(),
        )
        .unwrap();
        NewIncident {
            timestamp: Utc::now(),
            detection,
            threat_level: ThreatLevel::High,
            action: ResponseAction::ActivateCountermeasure,
            jammer: CountermeasureOutcome::Activated,
            email_alert: AlertOutcome::Sent,
        }
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let log = IncidentLog::new();
        assert_eq!(log.append(incident(0.9)).id, 1);
        assert_eq!(log.append(incident(0.91)).id, 2);
        assert_eq!(log.append(incident(0.92)).id, 3);

        let (count, entries) = log.list();
        assert_eq!(count, 3);
        let confidences: Vec<f64> = entries.iter().map(|e| e.detection.confidence()).collect();
        assert_eq!(confidences, vec![0.9, 0.91, 0.92]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let log = IncidentLog::new();
        assert_eq!(log.clear(), 0);

        log.append(incident(0.9));
        log.append(incident(0.9));
        assert_eq!(log.clear(), 2);
        assert_eq!(log.clear(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_ids_restart_after_clear() {
        let log = IncidentLog::new();
        log.append(incident(0.9));
        log.append(incident(0.9));
        log.clear();
        assert_eq!(log.append(incident(0.9)).id, 1);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(IncidentLog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        log.append(incident(0.9));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let (count, entries) = log.list();
        assert_eq!(count, 200);
        let mut ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.last(), Some(&200));
    }

    #[test]
    fn test_entry_serialization() {
        let log = IncidentLog::new();
        let entry = log.append(incident(0.92));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["threat_level"], "HIGH");
        assert_eq!(json["action"], "ACTIVATE_COUNTERMEASURE");
        assert_eq!(json["jammer"], "ACTIVATED");
        assert_eq!(json["email_alert"], "SENT");
        assert_eq!(json["detection"]["class_name"], "drone");
    }
}
