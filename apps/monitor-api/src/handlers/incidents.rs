// [apps/monitor-api/src/handlers/incidents.rs]
//! =================================================================
//! APARATO: INCIDENT FEED HANDLER (V1.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
//! RESPONSABILIDAD: LECTURA DEL ESTADO DE INCIDENTES DE UN TENANT
//! =================================================================

use crate::errors::ApiError;
use crate::middleware::TenantIdentity;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Extension;
use axum::Json;
use monitor_engine::EngineError;
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ListIncidentsQuery {
    /// Si es `true` (valor por defecto), sólo se listan los incidentes
    /// abiertos; si es `false`, se devuelve el histórico completo.
    #[serde(default = "default_open_only")]
    pub open_only: bool,
}

fn default_open_only() -> bool {
    true
}

pub struct IncidentsHandler;

impl IncidentsHandler {
    #[instrument(skip(state))]
    pub async fn handle_list_incidents(
        State(state): State<AppState>,
        Extension(tenant): Extension<TenantIdentity>,
        Query(query): Query<ListIncidentsQuery>,
    ) -> Result<Json<serde_json::Value>, ApiError> {
        let incidents = if query.open_only {
            state.incidents.list_open(&tenant.tenant_id).await
        } else {
            state.incidents.list_all(&tenant.tenant_id).await
        }
        .map_err(EngineError::from)?;

        Ok(Json(serde_json::json!({ "incidents": incidents })))
    }
}
