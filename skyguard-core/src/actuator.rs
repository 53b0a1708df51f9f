//! Simulated countermeasure actuator.
//!
//! No RF hardware is ever touched: the [`SimulatedJammer`] walks a fixed
//! sequence of timed steps through STANDBY → ACTIVATING → OPERATIONAL →
//! DEACTIVATING → STANDBY and logs each one.
//!
//! Cycles are serialized through a FIFO queue: a second `activate()` waits
//! until the running cycle has returned to STANDBY. A manual override only
//! changes the reported phase; the running cycle still sleeps through its
//! remaining steps before `activate()` returns. On a fault or a cancelled
//! caller a drop guard puts the actuator back into STANDBY.

use crate::clock::{Clock, SystemClock};
use crate::error::ActuatorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Activation state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActuatorPhase {
    Standby,
    Activating,
    Operational,
    Deactivating,
}

impl std::fmt::Display for ActuatorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorPhase::Standby => write!(f, "standby"),
            ActuatorPhase::Activating => write!(f, "activating"),
            ActuatorPhase::Operational => write!(f, "operational"),
            ActuatorPhase::Deactivating => write!(f, "deactivating"),
        }
    }
}

/// One ordered sub-step of the activation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStep {
    pub phase: ActuatorPhase,
    pub label: &'static str,
    pub latency: Duration,
}

const fn step(phase: ActuatorPhase, label: &'static str, millis: u64) -> CycleStep {
    CycleStep {
        phase,
        label,
        latency: Duration::from_millis(millis),
    }
}

/// Upper bound accepted for [`ActuatorConfig::time_scale`].
pub const MAX_TIME_SCALE: f64 = 100.0;

/// Reference activation sequence, 4.8s end to end at `time_scale = 1.0`.
pub const REFERENCE_CYCLE: [CycleStep; 7] = [
    step(ActuatorPhase::Activating, "frequency analysis", 500),
    step(ActuatorPhase::Activating, "target signature identified", 300),
    step(ActuatorPhase::Activating, "jamming pattern generated", 400),
    step(ActuatorPhase::Activating, "output circuits energized", 600),
    step(ActuatorPhase::Operational, "denial mode engaged", 1000),
    step(ActuatorPhase::Operational, "control link disruption held", 1500),
    step(ActuatorPhase::Deactivating, "output powered down", 500),
];

/// Actuator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Multiplier applied to every step latency (0 disables delays).
    pub time_scale: f64,
}

impl ActuatorConfig {
    /// Whether `time_scale` is finite and within `0..=MAX_TIME_SCALE`.
    pub fn time_scale_is_valid(&self) -> bool {
        self.time_scale.is_finite() && (0.0..=MAX_TIME_SCALE).contains(&self.time_scale)
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

/// Point-in-time view of the actuator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorStatus {
    pub phase: ActuatorPhase,
    pub is_active: bool,
    pub activation_count: u64,
    pub last_activation: Option<DateTime<Utc>>,
}

/// Summary of one completed activation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationReport {
    pub activation: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps_completed: usize,
    /// A manual override forced STANDBY while the cycle was running.
    pub overridden: bool,
}

/// A countermeasure the orchestrator can drive.
#[async_trait]
pub trait Countermeasure: Send + Sync {
    /// Run one full activation cycle; returns once back in STANDBY.
    async fn activate(&self) -> Result<ActivationReport, ActuatorError>;

    /// Manual override: force STANDBY. Returns whether it was active.
    fn deactivate(&self) -> bool;

    fn status(&self) -> ActuatorStatus;
}

#[derive(Debug)]
struct ActuatorState {
    phase: ActuatorPhase,
    activation_count: u64,
    last_activation: Option<DateTime<Utc>>,
    /// Bumped on every manual override so a running cycle can notice it.
    override_epoch: u64,
}

/// Simulated jammer with a serialized, timed activation cycle.
pub struct SimulatedJammer {
    clock: Arc<dyn Clock>,
    time_scale: f64,
    steps: Vec<CycleStep>,
    fault_at: Option<usize>,
    state: Mutex<ActuatorState>,
    cycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SimulatedJammer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedJammer")
            .field("time_scale", &self.time_scale)
            .field("steps", &self.steps.len())
            .field("state", &*self.lock_state())
            .finish()
    }
}

impl SimulatedJammer {
    pub fn new(config: &ActuatorConfig, clock: Arc<dyn Clock>) -> Self {
        let time_scale = if config.time_scale_is_valid() {
            config.time_scale
        } else {
            warn!(
                time_scale = config.time_scale,
                "Invalid actuator time scale, using reference timing"
            );
            1.0
        };
        Self {
            clock,
            time_scale,
            steps: REFERENCE_CYCLE.to_vec(),
            fault_at: None,
            state: Mutex::new(ActuatorState {
                phase: ActuatorPhase::Standby,
                activation_count: 0,
                last_activation: None,
                override_epoch: 0,
            }),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Jammer on the system clock with reference timing.
    pub fn with_defaults() -> Self {
        Self::new(&ActuatorConfig::default(), Arc::new(SystemClock))
    }

    /// Fail every cycle when it reaches step `index` (drills and tests).
    pub fn with_fault_at(mut self, index: usize) -> Self {
        self.fault_at = Some(index);
        self
    }

    pub fn steps(&self) -> &[CycleStep] {
        &self.steps
    }

    /// Full cycle duration after scaling.
    pub fn cycle_duration(&self) -> Duration {
        self.steps.iter().map(|s| self.scaled(s.latency)).sum()
    }

    fn scaled(&self, latency: Duration) -> Duration {
        Duration::try_from_secs_f64(latency.as_secs_f64() * self.time_scale)
            .unwrap_or(latency)
    }

    fn lock_state(&self) -> MutexGuard<'_, ActuatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `phase` unless an override happened since `epoch`.
    /// Returns false once the cycle has been overridden.
    fn enter(&self, epoch: u64, phase: ActuatorPhase) -> bool {
        let mut state = self.lock_state();
        if state.override_epoch != epoch {
            return false;
        }
        if state.phase != phase {
            debug!(from = %state.phase, to = %phase, "Actuator phase transition");
            state.phase = phase;
        }
        true
    }

    fn force_standby(&self) {
        let mut state = self.lock_state();
        if state.phase != ActuatorPhase::Standby {
            state.phase = ActuatorPhase::Standby;
            debug!("Actuator returned to standby");
        }
    }
}

/// Returns the actuator to STANDBY when the cycle scope ends, however it ends.
struct StandbyGuard<'a> {
    jammer: &'a SimulatedJammer,
}

impl Drop for StandbyGuard<'_> {
    fn drop(&mut self) {
        self.jammer.force_standby();
    }
}

#[async_trait]
impl Countermeasure for SimulatedJammer {
    async fn activate(&self) -> Result<ActivationReport, ActuatorError> {
        let _queue = self.cycle.lock().await;

        let started_at = self.clock.now();
        let (activation, epoch) = {
            let mut state = self.lock_state();
            state.activation_count += 1;
            state.last_activation = Some(started_at);
            state.phase = ActuatorPhase::Activating;
            (state.activation_count, state.override_epoch)
        };
        let _standby = StandbyGuard { jammer: self };

        info!(
            activation,
            "Countermeasure activation sequence started (simulation only, no RF output)"
        );

        let mut steps_completed = 0;
        let mut overridden = false;
        for (index, step) in self.steps.iter().enumerate() {
            if !self.enter(epoch, step.phase) && !overridden {
                overridden = true;
                warn!(
                    activation,
                    step = step.label,
                    "Manual override in effect, cycle continues in standby"
                );
            }
            if self.fault_at == Some(index) {
                warn!(activation, step = step.label, "Simulated actuator fault");
                return Err(ActuatorError::Fault {
                    step: step.label.to_string(),
                    message: "injected fault".to_string(),
                });
            }
            self.clock.sleep(self.scaled(step.latency)).await;
            steps_completed += 1;
            info!(activation, phase = %step.phase, step = step.label, "Actuator step complete");
        }

        // An override during the last step is only visible here.
        let overridden = overridden || self.lock_state().override_epoch != epoch;
        info!(activation, overridden, "Countermeasure cycle complete, standing by");

        Ok(ActivationReport {
            activation,
            started_at,
            finished_at: self.clock.now(),
            steps_completed,
            overridden,
        })
    }

    fn deactivate(&self) -> bool {
        let mut state = self.lock_state();
        state.override_epoch += 1;
        let was_active = state.phase != ActuatorPhase::Standby;
        if was_active {
            info!(from = %state.phase, "Manual override: actuator forced to standby");
            state.phase = ActuatorPhase::Standby;
        } else {
            debug!("Manual override requested while already in standby");
        }
        was_active
    }

    fn status(&self) -> ActuatorStatus {
        let state = self.lock_state();
        ActuatorStatus {
            phase: state.phase,
            is_active: state.phase != ActuatorPhase::Standby,
            activation_count: state.activation_count,
            last_activation: state.last_activation,
        }
    }
}
