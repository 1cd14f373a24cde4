/**
 * FLEET REST API - HTTP surface of the kernel
 *
 * ROLE: thin Axum handlers over the device registry. Devices post heartbeats
 * and activities and poll for commands; the control room queues commands and
 * reads fleet status and analytics.
 *
 * ROUTES:
 * - /api/device/{id}/...   device-facing (heartbeat, commands, activity)
 * - /api/control/...       command dispatch (stop, restart, emergency stop)
 * - /api/status/...        fleet snapshot, analytics, single device
 * - /health, /system/health, /
 *
 * ERRORS: KernelError renders as {"success": false, "error": ...}.
 * CORS is wide open so a browser dashboard can call every route.
 */

use crate::error::{validate_device_id, KernelError};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{rfc3339, ActivityIn, CommandKind, DeviceView, HeartbeatIn};
use crate::registry::{FleetStatus, SharedDeviceRegistry};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedDeviceRegistry,
    pub health: HealthTracker,
}

fn now_ts() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

/// Empty and `null` bodies are read as `{}`; anything else must be an object.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, KernelError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Ok(T::default());
    }
    if !value.is_object() {
        return Err(KernelError::expected_object());
    }
    Ok(serde_json::from_value(value)?)
}

fn checked_id(device_id: &str) -> Result<(), KernelError> {
    validate_device_id(device_id).inspect_err(|e| warn!("[http] rejected device id: {e}"))
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/system/health", get(system_health))
        .route("/api/device/{id}/heartbeat", post(device_heartbeat))
        .route("/api/device/{id}/commands", get(pending_commands))
        .route("/api/device/{id}/activity", post(device_activity))
        .route("/api/control/stop/{id}", post(stop_device))
        .route("/api/control/restart/{id}", post(restart_device))
        .route("/api/control/emergency_stop_all", post(emergency_stop_all))
        .route("/api/status/all", get(fleet_status))
        .route("/api/status/analytics", get(analytics))
        .route("/api/status/device/{id}", get(device_status))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// POST /api/device/{id}/heartbeat
async fn device_heartbeat(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, KernelError> {
    checked_id(&id)?;
    let hb: HeartbeatIn =
        parse_body(&body).inspect_err(|e| warn!("[http] heartbeat error for {id}: {e}"))?;
    app.registry.record_heartbeat(&id, hb);
    Ok(Json(json!({ "success": true, "timestamp": now_ts() })))
}

// GET /api/device/{id}/commands
async fn pending_commands(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, KernelError> {
    checked_id(&id)?;
    let commands = app.registry.fetch_pending_commands(&id);
    Ok(Json(json!({ "commands": commands, "timestamp": now_ts() })))
}

// POST /api/device/{id}/activity
async fn device_activity(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, KernelError> {
    checked_id(&id)?;
    let activity: ActivityIn =
        parse_body(&body).inspect_err(|e| warn!("[http] activity error for {id}: {e}"))?;
    app.registry.log_activity(&id, activity);
    Ok(Json(json!({ "success": true })))
}

// POST /api/control/stop/{id}
async fn stop_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, KernelError> {
    checked_id(&id)?;
    let params = json!({ "reason": "Manual stop from Control Room" });
    let cmd = app.registry.enqueue_command(&id, CommandKind::Stop, params);
    info!("[http] stop command sent to {id}");
    Ok(Json(json!({
        "success": true,
        "message": format!("Stop command sent to {id}"),
        "command_id": cmd.command_id,
    })))
}

// POST /api/control/restart/{id} (body = command parameters)
async fn restart_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, KernelError> {
    checked_id(&id)?;
    let params: Value =
        parse_body(&body).inspect_err(|e| warn!("[http] restart error for {id}: {e}"))?;
    let cmd = app.registry.enqueue_command(&id, CommandKind::Restart, params);
    info!("[http] restart command sent to {id}");
    Ok(Json(json!({
        "success": true,
        "message": format!("Restart command sent to {id}"),
        "command_id": cmd.command_id,
    })))
}

// POST /api/control/emergency_stop_all
async fn emergency_stop_all(State(app): State<AppState>) -> Json<Value> {
    let devices = app.registry.emergency_stop_all();
    Json(json!({
        "success": true,
        "message": format!("Emergency stop sent to {} devices", devices.len()),
        "devices": devices,
    }))
}

// GET /api/status/all
async fn fleet_status(State(app): State<AppState>) -> Json<FleetStatus> {
    Json(app.registry.fleet_status())
}

// GET /api/status/analytics
async fn analytics(State(app): State<AppState>) -> Json<Value> {
    let analytics = app.registry.analytics();
    Json(json!({ "timestamp": now_ts(), "analytics": analytics }))
}

// GET /api/status/device/{id}
async fn device_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, KernelError> {
    checked_id(&id)?;
    app.registry
        .device(&id)
        .map(Json)
        .ok_or(KernelError::DeviceNotFound(id))
}

// GET /health (never touches the registry)
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": now_ts() }))
}

// GET /system/health
async fn system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.registry))
}

// GET /
async fn service_info(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Fleet Kernel",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "timestamp": now_ts(),
        "connected_devices": app.registry.counters().devices_tracked,
        "endpoints": {
            "device_heartbeat": "/api/device/{id}/heartbeat [POST]",
            "device_commands": "/api/device/{id}/commands [GET]",
            "device_activity": "/api/device/{id}/activity [POST]",
            "control_stop": "/api/control/stop/{id} [POST]",
            "control_restart": "/api/control/restart/{id} [POST]",
            "emergency_stop": "/api/control/emergency_stop_all [POST]",
            "fleet_status": "/api/status/all [GET]",
            "analytics": "/api/status/analytics [GET]",
            "device_status": "/api/status/device/{id} [GET]",
            "health": "/health [GET]",
        }
    }))
}
