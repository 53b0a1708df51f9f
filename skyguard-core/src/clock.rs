//! Time source abstraction for timed state transitions.
//!
//! Production code runs on [`SystemClock`]; tests and drills use
//! [`VirtualClock`], which advances instantly on `sleep` so a full
//! actuation cycle completes without wall-clock delay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Source of wall time and delays.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated time that advances by exactly the requested amount on `sleep`.
#[derive(Debug)]
pub struct VirtualClock {
    origin: DateTime<Utc>,
    elapsed: Mutex<Duration>,
}

impl VirtualClock {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Total simulated time slept so far.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += duration;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.elapsed())
            .ok()
            .and_then(|elapsed| self.origin.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let other tasks observe intermediate states.
        tokio::task::yield_now().await;
    }
}
