// [apps/monitor-api/src/errors.rs]
//! =================================================================
//! APARATO: API ERROR MAPPING (V1.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
//! RESPONSABILIDAD: TRADUCCIÓN DE LA TAXONOMÍA DEL MOTOR A HTTP
//!
//! El núcleo nunca conoce HTTP; esta capa es la única que decide el
//! código de estado para cada variante de `EngineError` (y de los
//! errores de validación propios del borde de ingesta).
//! =================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use monitor_engine::EngineError;
use serde_json::json;
use tracing::{error, warn};

/// Error de borde: validación de la petición de ingesta que nunca
/// llega a tocar el motor (clave de idempotencia malformada, ventana
/// de tiempo violada, credencial ausente o equivocada).
#[derive(Debug)]
pub enum ApiError {
    MalformedIdempotencyKey,
    MissingCredential,
    WrongMachineCredential,
    TimeWindowViolation(String),
    InvalidSchema(String),
    NotFound(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        ApiError::Engine(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::MalformedIdempotencyKey => (
                StatusCode::BAD_REQUEST,
                "malformed_idempotency_key",
                "X-Ingest-Id must be a non-empty string of at most 64 characters".to_string(),
            ),
            ApiError::MissingCredential => (
                StatusCode::UNAUTHORIZED,
                "missing_credential",
                "no tenant credential supplied".to_string(),
            ),
            ApiError::WrongMachineCredential => (
                StatusCode::FORBIDDEN,
                "credential_machine_mismatch",
                "credential is bound to a different machine".to_string(),
            ),
            ApiError::TimeWindowViolation(reason) => (StatusCode::UNPROCESSABLE_ENTITY, "time_window_violation", reason),
            ApiError::InvalidSchema(reason) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_schema", reason),
            ApiError::NotFound(reason) => (StatusCode::NOT_FOUND, "not_found", reason),
            ApiError::Engine(EngineError::ValidationError(reason)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", reason)
            }
            ApiError::Engine(EngineError::NotAuthorized) => {
                (StatusCode::FORBIDDEN, "not_authorized", "not authorized".to_string())
            }
            ApiError::Engine(EngineError::NotAuthenticated) => {
                (StatusCode::UNAUTHORIZED, "not_authenticated", "not authenticated".to_string())
            }
            ApiError::Engine(EngineError::Duplicate) => {
                (StatusCode::OK, "duplicate", "duplicate request".to_string())
            }
            ApiError::Engine(EngineError::Conflict(reason)) => {
                warn!(reason = %reason, "conflict surfaced to client");
                (StatusCode::CONFLICT, "conflict", reason)
            }
            ApiError::Engine(EngineError::Transient(reason)) => {
                warn!(reason = %reason, "transient failure surfaced to client");
                (StatusCode::SERVICE_UNAVAILABLE, "transient", reason)
            }
            ApiError::Engine(EngineError::Fatal(reason)) => {
                error!(reason = %reason, "fatal failure surfaced to client");
                (StatusCode::INTERNAL_SERVER_ERROR, "fatal", reason)
            }
            ApiError::Engine(EngineError::Database(db_error)) => {
                error!(error = %db_error, "database failure surfaced to client");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", db_error.to_string())
            }
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
