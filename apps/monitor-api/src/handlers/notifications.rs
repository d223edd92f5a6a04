// [apps/monitor-api/src/handlers/notifications.rs]
//! =================================================================
//! APARATO: NOTIFICATION FEED HANDLER (V1.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
//! RESPONSABILIDAD: LECTURA Y CONFIRMACIÓN DE LECTURA DEL LIBRO DE AVISOS
//! =================================================================

use crate::errors::ApiError;
use crate::middleware::TenantIdentity;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Extension;
use axum::Json;
use monitor_engine::EngineError;
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub struct NotificationsHandler;

impl NotificationsHandler {
    #[instrument(skip(state))]
    pub async fn handle_list_notifications(
        State(state): State<AppState>,
        Extension(tenant): Extension<TenantIdentity>,
        Query(query): Query<ListNotificationsQuery>,
    ) -> Result<Json<serde_json::Value>, ApiError> {
        let entries = state
            .notification_ledger
            .list_for_tenant(&tenant.tenant_id, query.unread_only)
            .await
            .map_err(EngineError::from)?;

        Ok(Json(serde_json::json!({ "notifications": entries })))
    }

    #[instrument(skip(state))]
    pub async fn handle_mark_as_read(
        State(state): State<AppState>,
        Extension(tenant): Extension<TenantIdentity>,
        Path(notification_id): Path<String>,
    ) -> Result<Json<serde_json::Value>, ApiError> {
        let marked = state
            .notification_ledger
            .mark_read(&tenant.tenant_id, &notification_id)
            .await
            .map_err(EngineError::from)?;

        if !marked {
            return Err(ApiError::NotFound("notification not found for this tenant".into()));
        }

        Ok(Json(serde_json::json!({ "read": true })))
    }
}
