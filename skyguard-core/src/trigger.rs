//! Remote trigger client.
//!
//! Hands an escalating detection to the response service over HTTP. Every
//! call is bounded by the configured timeout and is never retried: a timeout
//! or connection failure is reported once and the caller moves on.

use crate::detection::DetectionEvent;
use crate::error::TransportError;
use crate::incident_log::{AlertOutcome, CountermeasureOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Full URL of the response service's trigger endpoint.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/trigger".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Wire body of a trigger call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub threat_detected: bool,
    #[serde(default)]
    pub detection: Option<DetectionEvent>,
    /// Sender-side timestamp, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TriggerRequest {
    pub fn threat(event: DetectionEvent, sent_at: DateTime<Utc>) -> Self {
        Self {
            threat_detected: true,
            detection: Some(event),
            timestamp: Some(sent_at.to_rfc3339()),
        }
    }
}

/// Per-phase outcomes echoed back by the response service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActions {
    pub jammer: CountermeasureOutcome,
    pub email_alert: AlertOutcome,
}

/// Acknowledgement returned by the response service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAck {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub actions: Option<TriggerActions>,
}

/// Bounded, non-retrying trigger client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TriggerClient {
    http: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl TriggerClient {
    pub fn new(config: &TriggerConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            // Detector and response service share a local network.
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Request {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Send one trigger and wait for the acknowledgement.
    pub async fn send(&self, event: &DetectionEvent) -> Result<TriggerAck, TransportError> {
        let body = TriggerRequest::threat(event.clone(), Utc::now());
        info!(endpoint = %self.endpoint, class = event.class_name(), "Sending remote trigger");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Remote trigger rejected");
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let ack: TriggerAck = response.json().await.map_err(|e| self.map_error(e))?;
        info!(status = %ack.status, message = %ack.message, "Remote trigger acknowledged");
        Ok(ack)
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            TransportError::Connection {
                message: e.to_string(),
            }
        } else {
            TransportError::Request {
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    fn event() -> DetectionEvent {
        DetectionEvent::new(
            "drone",
            0.92,
            BoundingBox::new(150.0, 100.0, 450.0, 400.0).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/trigger")
    }

    fn client(endpoint: String, timeout_secs: u64) -> TriggerClient {
        TriggerClient::new(&TriggerConfig {
            endpoint,
            timeout_secs,
        })
        .unwrap()
    }

    #[test]
    fn test_request_wire_shape() {
        let req = TriggerRequest::threat(event(), Utc::now());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["threat_detected"], true);
        assert_eq!(json["detection"]["class_name"], "drone");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_send_returns_ack() {
        let router = Router::new().route(
            "/trigger",
            post(|axum::Json(body): axum::Json<TriggerRequest>| async move {
                assert!(body.threat_detected);
                axum::Json(serde_json::json!({
                    "status": "success",
                    "message": "Threat response activated",
                    "actions": {"jammer": "ACTIVATED", "email_alert": "FAILED"}
                }))
            }),
        );
        let endpoint = serve(router).await;

        let ack = client(endpoint, 5).send(&event()).await.unwrap();
        assert_eq!(ack.status, "success");
        assert_eq!(
            ack.actions,
            Some(TriggerActions {
                jammer: CountermeasureOutcome::Activated,
                email_alert: AlertOutcome::Failed,
            })
        );
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/trigger",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let endpoint = serve(router).await;

        let err = client(endpoint, 5).send(&event()).await.unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedStatus { status: 503 }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/trigger"), 2)
            .send(&event())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out_without_retry() {
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/trigger",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    StatusCode::OK
                }
            }),
        );
        let endpoint = serve(router).await;

        let start = std::time::Instant::now();
        let err = client(endpoint, 1).send(&event()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { timeout_secs: 1 }));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
