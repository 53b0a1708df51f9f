//! # Skyguard Core
//!
//! Threat classification and response orchestration for a drone detection
//! system. A detection is classified into a threat level; escalating ones
//! drive a simulated countermeasure and an e-mail alert, and every confirmed
//! threat lands in an in-memory incident log.

pub mod actuator;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod detection;
pub mod error;
pub mod gateway;
pub mod incident_log;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod trigger;

// Re-export commonly used types at the crate root.
pub use actuator::{
    ActivationReport, ActuatorConfig, ActuatorPhase, ActuatorStatus, Countermeasure,
    SimulatedJammer,
};
pub use classifier::{
    ResponseAction, ThreatClassifier, ThreatEvaluation, ThreatLevel, ThreatThresholds,
};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{SkyguardConfig, load_config};
pub use detection::{BoundingBox, DetectionEvent};
pub use error::{Result, SkyguardError};
pub use gateway::{GatewayConfig, ResponseService};
pub use incident_log::{AlertOutcome, CountermeasureOutcome, IncidentEntry, IncidentLog};
pub use notifier::{MailTransport, Notifier, NotifierConfig, NotifierStats};
pub use orchestrator::{IncidentStage, Orchestrator, OrchestratorConfig, ResponseReport};
pub use pipeline::{EdgeEvaluator, PipelineStats};
pub use trigger::{TriggerClient, TriggerConfig};
