// [apps/monitor-api/src/handlers/ingest.rs]
//! =================================================================
//! APARATO: METRIC INGEST HANDLER (V1.0)
//! CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
//! RESPONSABILIDAD: RECEPCIÓN, DEDUPLICACIÓN Y DESPACHO DE MUESTRAS
//!
//! Punto de entrada único para los agentes reportantes. La cola
//! `ingest` de la que habla el modelo de concurrencia no existe como
//! broker separado aquí: la propia tarea async del handler de axum es
//! el análogo fiel de un worker que extrae un ítem de esa cola.
//! =================================================================

use crate::errors::ApiError;
use crate::middleware::TenantIdentity;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use monitor_domain::metric::{MetricType, Sample};
use monitor_engine::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{info, instrument, warn};

const MAX_INGEST_ID_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct IngestMachinePayload {
    pub hostname: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub tags: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct IngestMetricPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_alert_enabled")]
    pub alert_enabled: bool,
}

fn default_alert_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IngestRequestPayload {
    pub machine: IngestMachinePayload,
    pub metrics: Vec<IngestMetricPayload>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponsePayload {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

pub struct IngestHandler;

impl IngestHandler {
    #[instrument(skip(state, headers, payload), fields(tenant_id = %tenant.tenant_id, machine = %payload.machine.hostname))]
    pub async fn handle_ingest_metrics(
        State(state): State<AppState>,
        Extension(tenant): Extension<TenantIdentity>,
        headers: HeaderMap,
        Json(payload): Json<IngestRequestPayload>,
    ) -> Result<(StatusCode, Json<IngestResponsePayload>), ApiError> {
        let ingest_id = resolve_ingest_id(&headers, &tenant.tenant_id, &payload)?;

        let age_sec = (Utc::now() - payload.sent_at).num_seconds();
        if age_sec < -state.settings.ingest_future_max_sec {
            return Err(ApiError::TimeWindowViolation(format!(
                "sent_at is {} seconds in the future, beyond the allowed {} second tolerance",
                -age_sec, state.settings.ingest_future_max_sec
            )));
        }

        let reserved = state
            .idempotency
            .try_reserve(&tenant.tenant_id, &ingest_id)
            .await
            .map_err(EngineError::from)?;

        if !reserved {
            info!(ingest_id = %ingest_id, "duplicate ingest request");
            return Ok((
                StatusCode::OK,
                Json(IngestResponsePayload { status: "duplicate", ingest_id: Some(ingest_id), reason: None }),
            ));
        }

        if age_sec > state.settings.ingest_late_max_sec {
            warn!(ingest_id = %ingest_id, age_sec, "archiving stale ingest request without processing");
            return Ok((
                StatusCode::ACCEPTED,
                Json(IngestResponsePayload { status: "accepted", ingest_id: Some(ingest_id), reason: Some("archived") }),
            ));
        }

        Self::process(&state, &tenant.tenant_id, &payload).await?;

        Ok((
            StatusCode::ACCEPTED,
            Json(IngestResponsePayload { status: "accepted", ingest_id: Some(ingest_id), reason: None }),
        ))
    }

    async fn process(state: &AppState, tenant_id: &str, payload: &IngestRequestPayload) -> Result<(), ApiError> {
        let machine_id = state
            .machines
            .get_or_create(tenant_id, &payload.machine.hostname)
            .await
            .map_err(EngineError::from)?;
        state.machines.touch(&machine_id).await.map_err(EngineError::from)?;

        for (seq, metric) in payload.metrics.iter().enumerate() {
            let value = decode_value(metric)?;

            let metric_instance_id = state
                .metrics
                .get_or_create_instance(tenant_id, &machine_id, &metric.name, metric.metric_type, metric.alert_enabled)
                .await
                .map_err(EngineError::from)?;
            state.metrics.touch_instance(&metric_instance_id).await.map_err(EngineError::from)?;

            let sample = Sample {
                id: uuid::Uuid::new_v4().to_string(),
                metric_instance_id: metric_instance_id.clone(),
                value_numeric: value.numeric,
                value_bool: value.boolean,
                value_string: value.string,
                ts: payload.sent_at,
                seq: seq as i64,
            };
            state.metrics.insert_sample(&sample).await.map_err(EngineError::from)?;

            state
                .threshold_evaluator
                .evaluate_metric(tenant_id, &metric_instance_id)
                .await?;
        }

        Ok(())
    }
}

struct DecodedValue {
    numeric: Option<f64>,
    boolean: Option<bool>,
    string: Option<String>,
}

fn decode_value(metric: &IngestMetricPayload) -> Result<DecodedValue, ApiError> {
    match metric.metric_type {
        MetricType::Numeric => {
            let numeric = metric.value.as_f64().ok_or_else(|| {
                ApiError::InvalidSchema(format!("metric '{}' declares type=numeric but value is not a number", metric.name))
            })?;
            Ok(DecodedValue { numeric: Some(numeric), boolean: None, string: None })
        }
        MetricType::Boolean => {
            let boolean = metric.value.as_bool().ok_or_else(|| {
                ApiError::InvalidSchema(format!("metric '{}' declares type=boolean but value is not a boolean", metric.name))
            })?;
            Ok(DecodedValue { numeric: None, boolean: Some(boolean), string: None })
        }
        MetricType::String => {
            let string = metric.value.as_str().ok_or_else(|| {
                ApiError::InvalidSchema(format!("metric '{}' declares type=string but value is not a string", metric.name))
            })?;
            Ok(DecodedValue { numeric: None, boolean: None, string: Some(string.to_string()) })
        }
    }
}

/// Resuelve el `ingest_id` desde `X-Ingest-Id` si está presente (validando
/// longitud), o deriva un hash determinista de (tenant, hostname,
/// `sent_at` truncado al segundo, huella de las métricas) cuando el
/// agente no lo envía.
fn resolve_ingest_id(headers: &HeaderMap, tenant_id: &str, payload: &IngestRequestPayload) -> Result<String, ApiError> {
    if let Some(header_value) = headers.get("X-Ingest-Id") {
        let raw = header_value.to_str().map_err(|_| ApiError::MalformedIdempotencyKey)?;
        if raw.is_empty() || raw.len() > MAX_INGEST_ID_LEN {
            return Err(ApiError::MalformedIdempotencyKey);
        }
        return Ok(raw.to_string());
    }

    let mut hasher = DefaultHasher::new();
    tenant_id.hash(&mut hasher);
    payload.machine.hostname.hash(&mut hasher);
    payload.sent_at.timestamp().hash(&mut hasher);
    for metric in &payload.metrics {
        metric.name.hash(&mut hasher);
        metric.value.to_string().hash(&mut hasher);
    }
    Ok(format!("derived:{:016x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn payload() -> IngestRequestPayload {
        IngestRequestPayload {
            machine: IngestMachinePayload { hostname: "web-01".into(), os: None, tags: None },
            metrics: vec![IngestMetricPayload {
                name: "cpu.load".into(),
                metric_type: MetricType::Numeric,
                value: serde_json::json!(3.3),
                unit: None,
                alert_enabled: true,
            }],
            sent_at: "2026-07-28T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn header_ingest_id_is_used_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Ingest-Id", HeaderValue::from_static("abc-123"));
        let id = resolve_ingest_id(&headers, "tenant1", &payload()).unwrap();
        assert_eq!(id, "abc-123");
    }

    #[test]
    fn empty_header_ingest_id_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Ingest-Id", HeaderValue::from_static(""));
        assert!(matches!(
            resolve_ingest_id(&headers, "tenant1", &payload()),
            Err(ApiError::MalformedIdempotencyKey)
        ));
    }

    #[test]
    fn overlong_header_ingest_id_is_malformed() {
        let mut headers = HeaderMap::new();
        let long: String = "a".repeat(MAX_INGEST_ID_LEN + 1);
        headers.insert("X-Ingest-Id", HeaderValue::from_str(&long).unwrap());
        assert!(matches!(
            resolve_ingest_id(&headers, "tenant1", &payload()),
            Err(ApiError::MalformedIdempotencyKey)
        ));
    }

    #[test]
    fn derived_ingest_id_is_deterministic_for_identical_requests() {
        let headers = HeaderMap::new();
        let first = resolve_ingest_id(&headers, "tenant1", &payload()).unwrap();
        let second = resolve_ingest_id(&headers, "tenant1", &payload()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("derived:"));
    }

    #[test]
    fn derived_ingest_id_differs_across_tenants() {
        let headers = HeaderMap::new();
        let a = resolve_ingest_id(&headers, "tenant1", &payload()).unwrap();
        let b = resolve_ingest_id(&headers, "tenant2", &payload()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_value_rejects_type_mismatch() {
        let metric = IngestMetricPayload {
            name: "cpu.load".into(),
            metric_type: MetricType::Numeric,
            value: serde_json::json!("not-a-number"),
            unit: None,
            alert_enabled: true,
        };
        assert!(decode_value(&metric).is_err());
    }

    #[test]
    fn decode_value_accepts_matching_types() {
        let numeric = IngestMetricPayload {
            name: "cpu.load".into(),
            metric_type: MetricType::Numeric,
            value: serde_json::json!(1.5),
            unit: None,
            alert_enabled: true,
        };
        let decoded = decode_value(&numeric).unwrap();
        assert_eq!(decoded.numeric, Some(1.5));

        let boolean = IngestMetricPayload {
            name: "disk.healthy".into(),
            metric_type: MetricType::Boolean,
            value: serde_json::json!(true),
            unit: None,
            alert_enabled: true,
        };
        let decoded = decode_value(&boolean).unwrap();
        assert_eq!(decoded.boolean, Some(true));

        let string = IngestMetricPayload {
            name: "build.status".into(),
            metric_type: MetricType::String,
            value: serde_json::json!("green"),
            unit: None,
            alert_enabled: true,
        };
        let decoded = decode_value(&string).unwrap();
        assert_eq!(decoded.string, Some("green".to_string()));
    }
}
