//! Axum router and handlers for the response service.

use super::GatewayConfig;
use crate::classifier::ThreatLevel;
use crate::error::OrchestratorError;
use crate::orchestrator::{Orchestrator, ResponseReport};
use crate::trigger::TriggerRequest;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "Skyguard Response Service";

/// Shared state behind every handler.
#[derive(Debug)]
pub struct ResponseService {
    orchestrator: Arc<Orchestrator>,
}

impl ResponseService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}

type SharedService = Arc<ResponseService>;

fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    (
        status,
        axum::Json(serde_json::json!({
            "status": "error",
            "message": message.into(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Build the router. Every route is served at the root and under `/api`;
/// the `/api` copies accept cross-origin requests from dashboards.
pub fn router(service: SharedService) -> Router {
    let routes = Router::new()
        .route("/trigger", post(trigger_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/threat-log", get(list_log_handler).delete(clear_log_handler))
        .route("/jammer/deactivate", post(deactivate_handler));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes.layer(CorsLayer::permissive()))
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Threat trigger endpoint.
async fn trigger_handler(State(svc): State<SharedService>, body: Bytes) -> impl IntoResponse {
    if body.iter().all(u8::is_ascii_whitespace) {
        warn!("Empty trigger payload");
        return json_error(StatusCode::BAD_REQUEST, "Empty payload");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Malformed trigger payload");
            return json_error(StatusCode::BAD_REQUEST, format!("Invalid payload: {e}"));
        }
    };
    if is_empty_payload(&payload) {
        warn!("Empty trigger payload");
        return json_error(StatusCode::BAD_REQUEST, "Empty payload");
    }

    let request: TriggerRequest = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Malformed trigger payload");
            return json_error(StatusCode::BAD_REQUEST, format!("Invalid payload: {e}"));
        }
    };

    if !request.threat_detected {
        info!("No threat reported, monitoring only");
        return (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "status": "success",
                "message": "No action required",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        );
    }

    let Some(event) = request.detection else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Threat reported without detection details",
        );
    };

    if svc.orchestrator.is_shut_down() {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down");
    }

    // Run on a separate task so a disconnecting caller cannot cancel the
    // response cycle or its audit record.
    let orchestrator = svc.orchestrator.clone();
    let handle = tokio::spawn(async move { orchestrator.evaluate(event).await });

    match handle.await {
        Ok(Ok(report)) => (StatusCode::OK, axum::Json(trigger_body(&report))),
        Ok(Err(OrchestratorError::ShutDown)) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down")
        }
        Err(e) => {
            error!(error = %e, "Trigger task aborted");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// `null`, `{}`, `[]` and `""` carry nothing to act on.
fn is_empty_payload(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn trigger_body(report: &ResponseReport) -> serde_json::Value {
    let message = match report.evaluation.level() {
        ThreatLevel::High | ThreatLevel::Medium => "Threat response activated",
        ThreatLevel::Low => "Detection logged",
        ThreatLevel::None => "Below detection threshold, monitoring",
    };
    serde_json::json!({
        "status": "success",
        "message": message,
        "threat_level": report.evaluation.level(),
        "action": report.evaluation.action(),
        "actions": {
            "jammer": report.jammer,
            "email_alert": report.email_alert,
        },
        "alert_failure": report.alert_failure,
        "threat_entry": report.incident,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "operational",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status_handler(State(svc): State<SharedService>) -> impl IntoResponse {
    let orch = &svc.orchestrator;
    axum::Json(serde_json::json!({
        "status": "operational",
        "timestamp": Utc::now().to_rfc3339(),
        "jammer": orch.countermeasure().status(),
        "email_service": orch.notifier().stats(),
        "threats_logged": orch.log().len(),
    }))
}

async fn list_log_handler(State(svc): State<SharedService>) -> impl IntoResponse {
    let (count, entries) = svc.orchestrator.log().list();
    axum::Json(serde_json::json!({
        "status": "success",
        "threat_count": count,
        "threats": entries,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn clear_log_handler(State(svc): State<SharedService>) -> impl IntoResponse {
    let removed = svc.orchestrator.log().clear();
    axum::Json(serde_json::json!({
        "status": "success",
        "message": format!("Threat log cleared {removed} entries"),
        "removed": removed,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Manual override: force the countermeasure back to standby.
async fn deactivate_handler(State(svc): State<SharedService>) -> impl IntoResponse {
    let was_active = svc.orchestrator.countermeasure().deactivate();
    let message = if was_active {
        "Jammer deactivated"
    } else {
        "Jammer already in standby"
    };
    info!(was_active, "Manual jammer override");
    axum::Json(serde_json::json!({
        "status": "success",
        "message": message,
        "was_active": was_active,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "Endpoint not found")
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "Handler panicked");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// On shutdown the orchestrator stops admitting incidents; in-flight
/// requests are allowed to finish.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    service: SharedService,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let orchestrator = service.orchestrator.clone();
    let app = router(service);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            orchestrator.shutdown();
        })
        .await
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(service: SharedService, config: &GatewayConfig) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %config.addr(), "Response service listening");
    serve(listener, service, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_detection() {
        for empty in ["null", "{}", "[]", "\"\""] {
            let value: serde_json::Value = serde_json::from_str(empty).unwrap();
            assert!(is_empty_payload(&value), "{empty}");
        }
        for filled in [r#"{"threat_detected": false}"#, "[1]", "0", "false"] {
            let value: serde_json::Value = serde_json::from_str(filled).unwrap();
            assert!(!is_empty_payload(&value), "{filled}");
        }
    }

    #[test]
    fn test_panic_response_is_json_500() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
