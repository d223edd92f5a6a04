// libs/domain/models/src/incident.rs
//! El incidente: unidad central de estado del motor de monitoreo.
//! Un incidente abierto representa una condición anómala sostenida;
//! su cierre se decide exclusivamente por la reevaluación de la
//! condición que lo originó.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Un `Threshold` se incumplió.
    Breach,
    /// Una `MetricInstance` dejó de reportar dentro de su ventana de frescura.
    NoDataMetric,
    /// Todas las métricas de una `Machine` dejaron de reportar.
    NoDataMachine,
    /// Un `HttpTarget` falló su sondeo.
    HttpFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub tenant_id: String,
    /// Número secuencial por tenant, asignado en `open()`; usado para
    /// referencias humanas ("incidente #42").
    pub incident_number: i64,
    pub kind: IncidentKind,
    /// Clave de deduplicación: `breach:mi:<id>`, `no_data_metric:mi:<id>`,
    /// `no_data_machine:machine:<id>` o `http_failure:http:<id>`.
    pub dedup_key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub machine_id: Option<String>,
    pub metric_instance_id: Option<String>,
    pub http_target_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
