//! End-to-end orchestration scenarios across classifier, actuator, notifier
//! and incident log.

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use skyguard_core::error::NotificationError;
use skyguard_core::notifier::AlertMessage;
use skyguard_core::{
    ActuatorConfig, AlertOutcome, BoundingBox, Clock, Countermeasure, CountermeasureOutcome,
    DetectionEvent, IncidentLog, MailTransport, Notifier, NotifierConfig, Orchestrator,
    ResponseAction, SimulatedJammer, SystemClock, ThreatClassifier, ThreatLevel, VirtualClock,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct CountingTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl MailTransport for CountingTransport {
    async fn deliver(&self, _message: &AlertMessage) -> Result<(), NotificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn notifier(calls: Arc<AtomicUsize>) -> Arc<Notifier> {
    Arc::new(Notifier::new(
        NotifierConfig {
            sender: "ops@skyguard.test".into(),
            credential: "s3cret".into(),
            recipient: "duty@skyguard.test".into(),
            ..NotifierConfig::default()
        },
        Box::new(CountingTransport { calls }),
    ))
}

fn orchestrator(
    jammer: Arc<SimulatedJammer>,
    calls: Arc<AtomicUsize>,
    clock: Arc<dyn Clock>,
) -> Orchestrator {
    Orchestrator::new(
        ThreatClassifier::default(),
        jammer,
        notifier(calls),
        Arc::new(IncidentLog::new()),
        clock,
        4,
    )
}

fn event(confidence: f64) -> DetectionEvent {
    DetectionEvent::new(
        "drone",
        confidence,
        BoundingBox::new(150.0, 100.0, 450.0, 400.0).unwrap(),
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_actuator_fault_with_successful_alert_records_one_entry() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
    let jammer = Arc::new(
        SimulatedJammer::new(&ActuatorConfig::default(), clock.clone()).with_fault_at(2),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(jammer.clone(), calls.clone(), clock);

    let report = orch.evaluate(event(0.92)).await.unwrap();

    let entry = report.incident.unwrap();
    assert_eq!(entry.action, ResponseAction::ActivateCountermeasure);
    assert_eq!(entry.jammer, CountermeasureOutcome::Failed);
    assert_eq!(entry.email_alert, AlertOutcome::Sent);
    assert_eq!(orch.log().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!jammer.status().is_active);
}

#[tokio::test]
async fn test_mixed_feed_logs_only_detections() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
    let jammer = Arc::new(SimulatedJammer::new(&ActuatorConfig::default(), clock.clone()));
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = orchestrator(jammer.clone(), calls.clone(), clock);

    let mut levels = Vec::new();
    for c in [0.70, 0.75, 0.80, 0.85, 0.95] {
        levels.push(orch.evaluate(event(c)).await.unwrap().evaluation.level());
    }

    assert_eq!(
        levels,
        vec![
            ThreatLevel::None,
            ThreatLevel::Low,
            ThreatLevel::Medium,
            ThreatLevel::High,
            ThreatLevel::High,
        ]
    );
    let (count, entries) = orch.log().list();
    assert_eq!(count, 4);
    assert_eq!(
        entries.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(jammer.status().activation_count, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_concurrent_incidents_are_all_recorded() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
    let jammer = Arc::new(SimulatedJammer::new(&ActuatorConfig::default(), clock.clone()));
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = Arc::new(orchestrator(jammer.clone(), calls.clone(), clock));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.evaluate(event(0.86 + f64::from(i) * 0.01)).await })
        })
        .collect();
    for h in handles {
        let report = h.await.unwrap().unwrap();
        assert_eq!(report.jammer, CountermeasureOutcome::Activated);
    }

    let (count, entries) = orch.log().list();
    assert_eq!(count, 10);
    let mut ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    assert_eq!(jammer.status().activation_count, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_manual_override_during_cycle_still_logs_incident() {
    let jammer = Arc::new(SimulatedJammer::new(
        &ActuatorConfig { time_scale: 0.05 },
        Arc::new(SystemClock),
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let orch = Arc::new(orchestrator(
        jammer.clone(),
        calls.clone(),
        Arc::new(SystemClock),
    ));

    let started = std::time::Instant::now();
    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.evaluate(event(0.92)).await })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(jammer.deactivate());

    let report = running.await.unwrap().unwrap();
    let activation = report.activation.unwrap();
    assert!(activation.overridden);
    assert_eq!(activation.steps_completed, 7);
    assert!(started.elapsed() >= jammer.cycle_duration());
    assert_eq!(report.jammer, CountermeasureOutcome::Activated);
    assert_eq!(report.email_alert, AlertOutcome::Sent);
    assert_eq!(orch.log().len(), 1);
    assert!(!jammer.status().is_active);
}

#[tokio::test]
async fn test_clear_then_new_incident_restarts_ids() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
    let jammer = Arc::new(SimulatedJammer::new(&ActuatorConfig::default(), clock.clone()));
    let orch = orchestrator(jammer, Arc::new(AtomicUsize::new(0)), clock);

    orch.evaluate(event(0.78)).await.unwrap();
    orch.evaluate(event(0.79)).await.unwrap();
    assert_eq!(orch.log().clear(), 2);
    assert_eq!(orch.log().clear(), 0);

    let report = orch.evaluate(event(0.77)).await.unwrap();
    assert_eq!(report.incident.unwrap().id, 1);
}

#[test]
fn test_blocking_evaluation_with_tokio_test() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::default());
    let jammer = Arc::new(SimulatedJammer::new(&ActuatorConfig::default(), clock.clone()));
    let orch = orchestrator(jammer, Arc::new(AtomicUsize::new(0)), clock);

    let report = tokio_test::block_on(orch.evaluate(event(0.92))).unwrap();
    assert_eq!(report.evaluation.level(), ThreatLevel::High);
}
