//! Threat response orchestration.
//!
//! For each detection: classify, then (if escalating) run the countermeasure
//! phase followed by the notification phase, then record the incident.
//! Phases are isolated from each other: an error or a panic in one is
//! reported in that phase's outcome and never stops the next phase or the
//! audit record.
//!
//! Separate incidents run concurrently up to a worker limit enforced with a
//! semaphore. Closing the semaphore on shutdown rejects new incidents while
//! those already admitted finish.

use crate::actuator::{ActivationReport, Countermeasure};
use crate::classifier::{ThreatClassifier, ThreatEvaluation, ThreatLevel};
use crate::clock::Clock;
use crate::detection::DetectionEvent;
use crate::error::{FailureCategory, OrchestratorError};
use crate::incident_log::{
    AlertOutcome, CountermeasureOutcome, IncidentEntry, IncidentLog, NewIncident,
};
use crate::notifier::{AlertContext, Notifier};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Incidents processed concurrently; the actuator still runs one cycle at a time.
    pub max_concurrent_incidents: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_incidents: 4,
        }
    }
}

/// Lifecycle of a single incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStage {
    Received,
    Evaluated,
    Responding,
    Logged,
    Complete,
}

/// Aggregated outcome of one orchestrated detection.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseReport {
    pub evaluation: ThreatEvaluation,
    pub jammer: CountermeasureOutcome,
    pub email_alert: AlertOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_failure: Option<FailureCategory>,
    pub incident: Option<IncidentEntry>,
    /// Stages traversed, in order.
    pub stages: Vec<IncidentStage>,
}

pub struct Orchestrator {
    classifier: ThreatClassifier,
    countermeasure: Arc<dyn Countermeasure>,
    notifier: Arc<Notifier>,
    log: Arc<IncidentLog>,
    clock: Arc<dyn Clock>,
    workers: Semaphore,
    max_concurrent: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("classifier", &self.classifier)
            .field("max_concurrent", &self.max_concurrent)
            .field("shut_down", &self.workers.is_closed())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        classifier: ThreatClassifier,
        countermeasure: Arc<dyn Countermeasure>,
        notifier: Arc<Notifier>,
        log: Arc<IncidentLog>,
        clock: Arc<dyn Clock>,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            classifier,
            countermeasure,
            notifier,
            log,
            clock,
            workers: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    pub fn classifier(&self) -> &ThreatClassifier {
        &self.classifier
    }

    pub fn countermeasure(&self) -> &Arc<dyn Countermeasure> {
        &self.countermeasure
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn log(&self) -> &Arc<IncidentLog> {
        &self.log
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop admitting incidents. In-flight ones run to completion.
    pub fn shutdown(&self) {
        if !self.workers.is_closed() {
            info!("Orchestrator shutting down, rejecting new incidents");
            self.workers.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.workers.is_closed()
    }

    /// Classify a detection and run the mandated response.
    pub async fn evaluate(
        &self,
        event: DetectionEvent,
    ) -> Result<ResponseReport, OrchestratorError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| OrchestratorError::ShutDown)?;

        let mut stages = vec![IncidentStage::Received];
        let evaluation = self.classifier.evaluate(&event);
        stages.push(IncidentStage::Evaluated);
        info!(
            class = event.class_name(),
            confidence = event.confidence(),
            level = %evaluation.level(),
            action = %evaluation.action(),
            "Detection evaluated"
        );

        if evaluation.level() == ThreatLevel::None {
            stages.push(IncidentStage::Complete);
            return Ok(ResponseReport {
                evaluation,
                jammer: CountermeasureOutcome::Skipped,
                email_alert: AlertOutcome::Skipped,
                activation: None,
                alert_failure: None,
                incident: None,
                stages,
            });
        }

        let mut activation = None;
        let mut alert_failure = None;
        let (jammer, email_alert) = if evaluation.escalate() {
            stages.push(IncidentStage::Responding);
            let (jammer, report) = self.countermeasure_phase().await;
            activation = report;
            let (email, failure) = self
                .notification_phase(&event, evaluation.level(), jammer)
                .await;
            alert_failure = failure;
            (jammer, email)
        } else {
            debug!("Below escalation threshold, logging only");
            (CountermeasureOutcome::Skipped, AlertOutcome::Skipped)
        };

        let entry = self.log.append(NewIncident {
            timestamp: self.clock.now(),
            detection: event,
            threat_level: evaluation.level(),
            action: evaluation.action(),
            jammer,
            email_alert,
        });
        stages.push(IncidentStage::Logged);
        info!(
            incident_id = entry.id,
            level = %entry.threat_level,
            jammer = ?jammer,
            email_alert = ?email_alert,
            "Incident recorded"
        );
        stages.push(IncidentStage::Complete);

        Ok(ResponseReport {
            evaluation,
            jammer,
            email_alert,
            activation,
            alert_failure,
            incident: Some(entry),
            stages,
        })
    }

    async fn countermeasure_phase(&self) -> (CountermeasureOutcome, Option<ActivationReport>) {
        info!(phase = "countermeasure", "Activating countermeasure");
        match AssertUnwindSafe(self.countermeasure.activate())
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => {
                if report.overridden {
                    warn!(
                        phase = "countermeasure",
                        steps_completed = report.steps_completed,
                        "Countermeasure cycle completed under manual override"
                    );
                } else {
                    info!(phase = "countermeasure", "Countermeasure cycle complete");
                }
                (CountermeasureOutcome::Activated, Some(report))
            }
            Ok(Err(e)) => {
                error!(phase = "countermeasure", error = %e, "Countermeasure activation failed");
                (CountermeasureOutcome::Failed, None)
            }
            Err(_) => {
                error!(phase = "countermeasure", "Countermeasure activation panicked");
                (CountermeasureOutcome::Failed, None)
            }
        }
    }

    async fn notification_phase(
        &self,
        event: &DetectionEvent,
        level: ThreatLevel,
        countermeasure: CountermeasureOutcome,
    ) -> (AlertOutcome, Option<FailureCategory>) {
        info!(phase = "notification", "Sending threat alert");
        let ctx = AlertContext {
            event,
            level,
            countermeasure,
        };
        match AssertUnwindSafe(self.notifier.try_send(&ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(_)) => (AlertOutcome::Sent, None),
            Ok(Err(e)) => {
                warn!(
                    phase = "notification",
                    category = %e.category(),
                    "Threat alert not delivered"
                );
                (AlertOutcome::Failed, Some(e.category()))
            }
            Err(_) => {
                error!(phase = "notification", "Threat alert delivery panicked");
                (AlertOutcome::Failed, Some(FailureCategory::Unexpected))
            }
        }
    }
}
