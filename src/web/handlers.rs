//! HTTP handlers for API endpoints.

use crate::web::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Body of `PUT /api/unit`.
#[derive(Debug, Deserialize)]
pub struct UnitRequest {
    pub unit: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "thermolog",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Latest delivered value and whether it is still live.
///
/// When the session has ended the last known value is still returned with
/// `live: false`.
pub async fn get_reading(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "reading": state.latest(),
        "live": state.is_live(),
        "session": state.session_state(),
    }))
}

/// Current display unit.
pub async fn get_unit(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "unit": state.units().current() }))
}

/// Change the display unit. Unknown units are rejected with 400.
pub async fn put_unit(
    State(state): State<AppState>,
    Json(request): Json<UnitRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.units().set_tag(&request.unit) {
        Ok(unit) => {
            info!("Display unit set to {}", unit);
            Ok(Json(json!({ "unit": unit })))
        }
        Err(e) => {
            warn!("Rejected unit change: {}", e);
            Err((StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))
        }
    }
}
