//! Detector-side evaluation loop.
//!
//! [`EdgeEvaluator`] classifies detections where they are produced and, for
//! escalating ones, hands them to the response service through a
//! fire-and-forget [`TriggerClient`] call. Processing the next detection
//! never waits on an outstanding trigger.

use crate::classifier::{ThreatClassifier, ThreatEvaluation, ThreatLevel};
use crate::detection::DetectionEvent;
use crate::trigger::TriggerClient;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Snapshot of the evaluator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events_processed: u64,
    /// Detections at LOW or above.
    pub detections: u64,
    pub escalations: u64,
    pub triggers_launched: u64,
    pub triggers_succeeded: u64,
    pub triggers_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_processed: AtomicU64,
    detections: AtomicU64,
    escalations: AtomicU64,
    triggers_launched: AtomicU64,
    triggers_succeeded: AtomicU64,
    triggers_failed: AtomicU64,
}

pub struct EdgeEvaluator {
    classifier: ThreatClassifier,
    trigger: Option<TriggerClient>,
    counters: Arc<Counters>,
    in_flight: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for EdgeEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeEvaluator")
            .field("classifier", &self.classifier)
            .field("trigger", &self.trigger.as_ref().map(|t| t.endpoint()))
            .field("stats", &self.stats())
            .finish()
    }
}

impl EdgeEvaluator {
    /// Evaluator that only classifies and counts.
    pub fn new(classifier: ThreatClassifier) -> Self {
        Self {
            classifier,
            trigger: None,
            counters: Arc::new(Counters::default()),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Launch a remote trigger for every escalating detection.
    pub fn with_trigger(mut self, trigger: TriggerClient) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Classify one detection and launch a trigger if it escalates.
    ///
    /// Must run inside a Tokio runtime when a trigger client is set.
    pub fn process(&self, event: DetectionEvent) -> ThreatEvaluation {
        let evaluation = self.classifier.evaluate(&event);
        self.counters.events_processed.fetch_add(1, Ordering::Relaxed);

        if evaluation.level() >= ThreatLevel::Low {
            self.counters.detections.fetch_add(1, Ordering::Relaxed);
            info!(
                class = event.class_name(),
                confidence = event.confidence(),
                level = %evaluation.level(),
                action = %evaluation.action(),
                "Target detected"
            );
        } else {
            debug!(confidence = event.confidence(), "Below detection threshold");
        }

        if evaluation.escalate() {
            self.counters.escalations.fetch_add(1, Ordering::Relaxed);
            if let Some(trigger) = &self.trigger {
                self.launch(trigger.clone(), event);
            }
        }
        evaluation
    }

    fn launch(&self, trigger: TriggerClient, event: DetectionEvent) {
        self.counters.triggers_launched.fetch_add(1, Ordering::Relaxed);
        let counters = self.counters.clone();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished triggers so the set stays small on long feeds.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            match trigger.send(&event).await {
                Ok(_) => {
                    counters.triggers_succeeded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.triggers_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Remote trigger failed, continuing detection");
                }
            }
        });
    }

    /// Wait for every outstanding trigger to finish.
    pub async fn drain(&self) {
        let mut pending = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while pending.join_next().await.is_some() {}
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            events_processed: c.events_processed.load(Ordering::Relaxed),
            detections: c.detections.load(Ordering::Relaxed),
            escalations: c.escalations.load(Ordering::Relaxed),
            triggers_launched: c.triggers_launched.load(Ordering::Relaxed),
            triggers_succeeded: c.triggers_succeeded.load(Ordering::Relaxed),
            triggers_failed: c.triggers_failed.load(Ordering::Relaxed),
        }
    }
}
