//! REST routes for the bridge.
//!
//! The wire contract is camelCase JSON: success responses carry
//! `success: true` plus operation-specific fields, failures carry
//! `{success: false, error}` with a status code from the error taxonomy.
//! Request fields deserialize as optional so that missing-parameter
//! errors come from validation with the uniform envelope rather than a
//! deserializer rejection.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::BridgeError;
use crate::registry::{ConnectOutcome, DeviceKind, DeviceRegistry};

/// Build the bridge router with all endpoints and middleware.
pub fn router(registry: DeviceRegistry) -> Router {
    Router::new()
        .route("/pair/start", post(pair_start))
        .route("/pair/complete", post(pair_complete))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/unpair", post(unpair))
        .route("/key", post(send_key))
        .route("/app/launch", post(launch_app))
        .route("/text", post(send_text))
        .route("/status/{device_id}", get(device_status))
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

/// Failure envelope shared by every endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound { .. } => StatusCode::NOT_FOUND,
            BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::Provider(_) => StatusCode::BAD_GATEWAY,
            BridgeError::Config(_) | BridgeError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or_default()
}

// -- /pair/start --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPairingRequest {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    device_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartPairingResponse {
    success: bool,
    message: &'static str,
    device_id: String,
    code_displayed: bool,
}

async fn pair_start(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<StartPairingRequest>,
) -> Result<Json<StartPairingResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    let started = registry
        .start_pairing(device_id, field(&req.host), req.device_name.as_deref())
        .await?;
    Ok(Json(StartPairingResponse {
        success: true,
        message: "Pairing initiated - check TV for 6-digit code",
        device_id: device_id.to_string(),
        code_displayed: started.code_displayed,
    }))
}

// -- /pair/complete --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletePairingRequest {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// `private_key` carries the same serialized material as `certificate`:
/// the provider hands back one opaque blob and existing drivers read
/// both fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletePairingResponse {
    success: bool,
    message: &'static str,
    device_id: String,
    certificate: String,
    private_key: String,
}

async fn pair_complete(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<CompletePairingRequest>,
) -> Result<Json<CompletePairingResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    let completed = registry
        .complete_pairing(device_id, field(&req.code))
        .await?;
    Ok(Json(CompletePairingResponse {
        success: true,
        message: "Pairing successful",
        device_id: device_id.to_string(),
        private_key: completed.certificate.clone(),
        certificate: completed.certificate,
    }))
}

// -- /connect --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    certificate: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleResponse {
    success: bool,
    message: String,
    device_id: String,
}

impl SimpleResponse {
    fn new(device_id: &str, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            device_id: device_id.to_string(),
        })
    }
}

async fn connect(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    let certificate = req.certificate.as_deref().filter(|c| !c.is_empty());
    let outcome = registry
        .connect(device_id, field(&req.host), certificate)
        .await?;
    let message = match outcome {
        ConnectOutcome::Connected => "Connected successfully",
        ConnectOutcome::AlreadyConnected => "Already connected",
    };
    Ok(SimpleResponse::new(device_id, message))
}

// -- /disconnect, /unpair --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRequest {
    #[serde(default)]
    device_id: Option<String>,
}

async fn disconnect(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<DeviceRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    registry.disconnect(device_id).await?;
    Ok(SimpleResponse::new(device_id, "Disconnected"))
}

async fn unpair(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<DeviceRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    registry.unpair(device_id).await?;
    Ok(SimpleResponse::new(
        device_id,
        "Unpaired from bridge. Also clear the remote service data on the TV to fully reset.",
    ))
}

// -- /key --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRequest {
    #[serde(default)]
    device_id: Option<String>,
    /// JSON number or numeric string; anything else is a validation
    /// error, not a deserializer rejection.
    #[serde(default)]
    key_code: Option<serde_json::Value>,
    #[serde(default)]
    key_name: Option<String>,
}

fn parse_key_code(value: Option<&serde_json::Value>) -> Result<i32, BridgeError> {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        BridgeError::validation("Missing or invalid required parameter: keyCode")
    })
}

async fn send_key(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    let key_code = parse_key_code(req.key_code.as_ref())?;
    registry
        .send_key(device_id, key_code, req.key_name.as_deref())
        .await?;
    let message = match req.key_name.as_deref() {
        Some(name) => format!("Sent key: {name}"),
        None => format!("Sent key: {key_code}"),
    };
    Ok(SimpleResponse::new(device_id, message))
}

// -- /app/launch --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchAppRequest {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    app_url: Option<String>,
}

async fn launch_app(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<LaunchAppRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    registry.launch_app(device_id, field(&req.app_url)).await?;
    Ok(SimpleResponse::new(device_id, "App launched"))
}

// -- /text --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRequest {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

async fn send_text(
    State(registry): State<DeviceRegistry>,
    Json(req): Json<TextRequest>,
) -> Result<Json<SimpleResponse>, BridgeError> {
    let device_id = field(&req.device_id);
    let message = registry.send_text(device_id, field(&req.text)).await?;
    Ok(SimpleResponse::new(device_id, message))
}

// -- /status/{device_id} --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    success: bool,
    connected: bool,
    device_id: String,
    /// Epoch milliseconds; null for unknown devices.
    last_activity: Option<i64>,
}

async fn device_status(
    State(registry): State<DeviceRegistry>,
    Path(device_id): Path<String>,
) -> Json<StatusResponse> {
    let status = registry.status(&device_id).await;
    Json(StatusResponse {
        success: true,
        connected: status.connected,
        device_id,
        last_activity: status.last_activity.map(|t| t.timestamp_millis()),
    })
}

// -- /health --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    connected_devices: usize,
    pairing_in_progress: usize,
    total_devices: usize,
    uptime: u64,
}

async fn health(State(registry): State<DeviceRegistry>) -> Json<HealthResponse> {
    let snapshot = registry.health().await;
    Json(HealthResponse {
        status: "ok",
        connected_devices: snapshot.connected_devices,
        pairing_in_progress: snapshot.pairing_in_progress,
        total_devices: snapshot.total_devices,
        uptime: snapshot.uptime_secs,
    })
}

// -- /devices --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRow {
    device_id: String,
    #[serde(rename = "type")]
    kind: DeviceKind,
    host: String,
    connected: bool,
    last_activity: Option<i64>,
}

#[derive(Debug, Serialize)]
struct DevicesResponse {
    devices: Vec<DeviceRow>,
    count: usize,
}

async fn list_devices(State(registry): State<DeviceRegistry>) -> Json<DevicesResponse> {
    let devices: Vec<DeviceRow> = registry
        .list_devices()
        .await
        .into_iter()
        .map(|d| DeviceRow {
            device_id: d.device_id,
            kind: d.kind,
            host: d.host,
            connected: d.connected,
            last_activity: d.last_activity.map(|t| t.timestamp_millis()),
        })
        .collect();
    let count = devices.len();
    Json(DevicesResponse { devices, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::ProviderError;

    fn status_of(err: BridgeError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(BridgeError::validation("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BridgeError::not_found("dev", "hint")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BridgeError::Timeout {
                what: "x".to_string(),
                timeout: Duration::from_secs(1),
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(BridgeError::Provider(ProviderError::Closed)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(BridgeError::Server("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_key_code_accepts_number_and_numeric_string() {
        assert_eq!(parse_key_code(Some(&serde_json::json!(26))).unwrap(), 26);
        assert_eq!(parse_key_code(Some(&serde_json::json!("26"))).unwrap(), 26);
        assert_eq!(
            parse_key_code(Some(&serde_json::json!(" 85 "))).unwrap(),
            85
        );
    }

    #[test]
    fn test_parse_key_code_rejects_everything_else() {
        for value in [
            None,
            Some(serde_json::json!("power")),
            Some(serde_json::json!(26.5)),
            Some(serde_json::json!(null)),
            Some(serde_json::json!(true)),
            Some(serde_json::json!(i64::from(i32::MAX) + 1)),
        ] {
            assert!(
                parse_key_code(value.as_ref()).is_err(),
                "should reject {value:?}"
            );
        }
    }
}
