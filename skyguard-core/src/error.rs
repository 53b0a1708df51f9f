//! Error types for the Skyguard core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering validation, configuration, transport, actuation, notification,
//! and orchestration domains.

/// Top-level error type for the Skyguard core library.
#[derive(Debug, thiserror::Error)]
pub enum SkyguardError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected input: a malformed detection or an unusable alert destination.
///
/// Always raised before any side effect takes place.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Confidence {value} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange { value: f64 },

    #[error("Invalid bounding box [{x1}, {y1}, {x2}, {y2}]: expected x1 < x2 and y1 < y2")]
    InvalidBoundingBox { x1: f64, y1: f64, x2: f64, y2: f64 },

    #[error("Detection class name is empty")]
    EmptyClassName,

    #[error("Unparseable timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("Alert destination field '{field}' is not configured")]
    MissingDestination { field: &'static str },

    #[error("Alert destination field '{field}' still holds the placeholder value")]
    PlaceholderDestination { field: &'static str },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error(
        "Thresholds must satisfy 0 <= low <= medium <= high <= 1 (got low={low}, medium={medium}, high={high})"
    )]
    ThresholdOrder { low: f64, medium: f64, high: f64 },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Failures of the remote trigger call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Trigger request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Trigger endpoint unreachable: {message}")]
    Connection { message: String },

    #[error("Trigger endpoint answered with status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Trigger request failed: {message}")]
    Request { message: String },
}

/// Faults raised by a countermeasure activation cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuatorError {
    #[error("Fault during '{step}': {message}")]
    Fault { step: String, message: String },
}

/// The distinct failure classes reported by the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Validation,
    Authentication,
    Protocol,
    Unexpected,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCategory::Validation => write!(f, "validation"),
            FailureCategory::Authentication => write!(f, "authentication"),
            FailureCategory::Protocol => write!(f, "protocol"),
            FailureCategory::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Errors from alert delivery.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid alert destination: {0}")]
    InvalidDestination(#[from] ValidationError),

    #[error("SMTP authentication failed: {message}")]
    Authentication { message: String },

    #[error("SMTP protocol error: {message}")]
    Protocol { message: String },

    #[error("Unexpected delivery failure: {message}")]
    Unexpected { message: String },
}

impl NotificationError {
    /// Failure class used in logs and reports.
    pub fn category(&self) -> FailureCategory {
        match self {
            NotificationError::InvalidDestination(_) => FailureCategory::Validation,
            NotificationError::Authentication { .. } => FailureCategory::Authentication,
            NotificationError::Protocol { .. } => FailureCategory::Protocol,
            NotificationError::Unexpected { .. } => FailureCategory::Unexpected,
        }
    }
}

/// Errors from the response orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Orchestrator has been shut down")]
    ShutDown,
}

/// A type alias for results using the top-level `SkyguardError`.
pub type Result<T> = std::result::Result<T, SkyguardError>;
