//! # Response Gateway
//!
//! HTTP boundary of the response service. Receives trigger calls from
//! detectors, runs them through the [`Orchestrator`](crate::orchestrator::Orchestrator)
//! and exposes status, incident log inspection and manual actuator override.

mod server;

pub use server::{ResponseService, router as gateway_router, run as run_gateway, serve};

use serde::{Deserialize, Serialize};

/// Listen address of the response service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
