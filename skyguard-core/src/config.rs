//! Configuration system for Skyguard.
//!
//! Uses `figment` for layered configuration loading, from lowest to highest
//! priority:
//!
//! 1. Built-in defaults
//! 2. User config (`~/.config/skyguard/config.toml`)
//! 3. Workspace config (`.skyguard/config.toml`)
//! 4. Legacy flat mail variables (`SMTP_SERVER`, `SENDER_EMAIL`, ...)
//! 5. Environment variables prefixed with `SKYGUARD_` (`SKYGUARD_NOTIFIER__RECIPIENT`)
//! 6. Explicit overrides

use crate::actuator::{ActuatorConfig, MAX_TIME_SCALE, SimulatedJammer};
use crate::classifier::{ThreatClassifier, ThreatThresholds};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::gateway::GatewayConfig;
use crate::incident_log::IncidentLog;
use crate::notifier::{Notifier, NotifierConfig};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::trigger::TriggerConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Legacy variable names and the keys they feed.
const LEGACY_MAIL_VARS: [(&str, &str); 5] = [
    ("SMTP_SERVER", "notifier.smtp_host"),
    ("SMTP_PORT", "notifier.smtp_port"),
    ("SENDER_EMAIL", "notifier.sender"),
    ("SENDER_PASSWORD", "notifier.credential"),
    ("RECIPIENT_EMAIL", "notifier.recipient"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyguardConfig {
    pub thresholds: ThreatThresholds,
    pub actuator: ActuatorConfig,
    pub notifier: NotifierConfig,
    pub gateway: GatewayConfig,
    pub trigger: TriggerConfig,
    pub orchestrator: OrchestratorConfig,
}

impl SkyguardConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.orchestrator.max_concurrent_incidents == 0 {
            return Err(ConfigError::Invalid {
                message: "orchestrator.max_concurrent_incidents must be at least 1".into(),
            });
        }
        if self.trigger.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "trigger.timeout_secs must be at least 1".into(),
            });
        }
        if !self.actuator.time_scale_is_valid() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "actuator.time_scale must be between 0 and {MAX_TIME_SCALE} (got {})",
                    self.actuator.time_scale
                ),
            });
        }
        if self.trigger.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "trigger.endpoint is empty".into(),
            });
        }
        Ok(())
    }

    /// Problems worth reporting that do not stop the service.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = self.notifier.validate_destination() {
            warnings.push(format!("Alerts will not be delivered: {e}"));
        }
        if !self.notifier.starttls {
            warnings.push("SMTP STARTTLS is disabled, credentials travel in plaintext".into());
        }
        if self.actuator.time_scale != 1.0 {
            warnings.push(format!(
                "Actuator runs at {}x reference timing",
                self.actuator.time_scale
            ));
        }
        warnings
    }

    /// Copy safe to print or write to logs.
    pub fn redacted(&self) -> Self {
        Self {
            notifier: self.notifier.redacted(),
            ..self.clone()
        }
    }

    /// Wire up an orchestrator on the system clock with SMTP delivery.
    pub fn build_orchestrator(&self) -> Result<Orchestrator, ConfigError> {
        self.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let classifier = ThreatClassifier::new(self.thresholds)?;
        let jammer = SimulatedJammer::new(&self.actuator, clock.clone());
        let notifier = Notifier::smtp(self.notifier.clone());
        Ok(Orchestrator::new(
            classifier,
            Arc::new(jammer),
            Arc::new(notifier),
            Arc::new(IncidentLog::new()),
            clock,
            self.orchestrator.max_concurrent_incidents,
        ))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "skyguard", "skyguard")
}

/// Path of the workspace config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".skyguard").join("config.toml")
}

/// Load configuration from all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SkyguardConfig>,
) -> Result<SkyguardConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SkyguardConfig::default()));

    // User-level config
    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Flat mail variables used by older deployments
    let legacy: Vec<&str> = LEGACY_MAIL_VARS.iter().map(|(var, _)| *var).collect();
    figment = figment.merge(Env::raw().only(&legacy).map(|key| {
        LEGACY_MAIL_VARS
            .iter()
            .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var))
            .map(|(_, target)| (*target).into())
            .unwrap_or_else(|| key.as_str().to_string().into())
    }));

    // SKYGUARD_NOTIFIER__RECIPIENT, SKYGUARD_GATEWAY__PORT, ...
    figment = figment.merge(Env::prefixed("SKYGUARD_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether a user or workspace config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    let user = project_dirs().is_some_and(|dirs| dirs.config_dir().join("config.toml").exists());
    user || workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Write the default configuration to `.skyguard/config.toml` in `workspace`.
///
/// Refuses to overwrite an existing file.
pub fn write_default_config(workspace: &Path) -> crate::error::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        }
        .into());
    }
    let contents =
        toml::to_string_pretty(&SkyguardConfig::default()).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::PLACEHOLDER_RECIPIENT;

    #[test]
    fn test_default_config() {
        let config = SkyguardConfig::default();
        assert_eq!(config.thresholds.high, 0.85);
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.trigger.timeout_secs, 5);
        assert_eq!(config.orchestrator.max_concurrent_incidents, 4);
        assert_eq!(config.notifier.recipient, PLACEHOLDER_RECIPIENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_warns_about_placeholders() {
        let warnings = SkyguardConfig::default().warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("sender"));
    }

    #[test]
    fn test_validate_rejects_fatal_settings() {
        let mut config = SkyguardConfig::default();
        config.thresholds.low = 0.9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));

        let mut config = SkyguardConfig::default();
        config.orchestrator.max_concurrent_incidents = 0;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.trigger.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.actuator.time_scale = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.actuator.time_scale = 1e300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = SkyguardConfig::default();
        overrides.gateway.port = 6100;
        overrides.thresholds.high = 0.9;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.gateway.port, 6100);
        assert_eq!(config.thresholds.high, 0.9);
    }

    #[test]
    fn test_load_config_from_partial_workspace_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = workspace_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"
[thresholds]
low = 0.6
medium = 0.7
high = 0.8

[notifier]
recipient = "duty@skyguard.test"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.thresholds.low, 0.6);
        assert_eq!(config.notifier.recipient, "duty@skyguard.test");
        assert_eq!(config.notifier.smtp_port, 587);
        assert_eq!(config.gateway.port, 5000);
        assert!(config_exists(Some(dir.path())));
    }

    #[test]
    fn test_write_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config(dir.path()).unwrap();
        assert!(path.exists());

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.thresholds, ThreatThresholds::default());
        assert!(write_default_config(dir.path()).is_err());
    }

    #[test]
    fn test_redacted_masks_credential() {
        let mut config = SkyguardConfig::default();
        config.notifier.credential = "s3cret".into();
        let toml = toml::to_string(&config.redacted()).unwrap();
        assert!(!toml.contains("s3cret"));
    }

    #[test]
    fn test_build_orchestrator() {
        let orchestrator = SkyguardConfig::default().build_orchestrator().unwrap();
        assert_eq!(orchestrator.max_concurrent(), 4);
        assert!(orchestrator.log().is_empty());
    }
}
