// [apps/monitor-api/src/middleware.rs]
//! =================================================================
//! APARATO: AUTHENTICATION GUARD (V1.0)
//! CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
//! RESPONSABILIDAD: VALIDACIÓN DEL CREDENCIAL DE TENANT E INYECCIÓN DE IDENTIDAD
//!
//! Un único esquema de credencial: la cabecera `Authorization: Bearer
//! <api_key>` se resuelve contra `tenants.api_key` y el tenant resuelto
//! se inyecta en las extensiones de la petición para que los handlers
//! de L4 no vuelvan a tocar la base de datos para saber quién llama.
//! =================================================================

use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use monitor_domain::tenant::Tenant;
use tracing::debug;

/// Identidad del tenant resuelta por el guardia, disponible a los
/// handlers vía `Extension<TenantIdentity>`.
#[derive(Debug, Clone)]
pub struct TenantIdentity {
    pub tenant_id: String,
}

pub async fn auth_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    let Some(api_key) = token else {
        return Err(ApiError::MissingCredential);
    };

    let tenant: Option<Tenant> = state.tenants.find_by_api_key(&api_key).await.map_err(monitor_engine::EngineError::from)?;

    match tenant {
        Some(tenant) => {
            debug!(tenant_id = %tenant.id, "request authenticated");
            req.extensions_mut().insert(TenantIdentity { tenant_id: tenant.id });
            Ok(next.run(req).await)
        }
        None => Err(ApiError::MissingCredential),
    }
}
