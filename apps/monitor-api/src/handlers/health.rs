// [apps/monitor-api/src/handlers/health.rs]
//! Sonda de vida para balanceadores/orquestadores. No toca la base de
//! datos: el proceso respondiendo es en sí la señal.

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

pub async fn handle_health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
