// [libs/engine/src/services/mod.rs]
//! =================================================================
//! APARATO: SERVICE LAYER (V1.0)
//! CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
//! RESPONSABILIDAD: ORQUESTACIÓN DE LOS DAEMONS DEL MOTOR DE INCIDENTES
//!
//! Cada detector (evaluador de umbrales, escáner de frescura, sondeo
//! HTTP) decide cuándo un incidente merece un aviso y lo coloca en la
//! cola `notify`; el despachador (C6) es su único consumidor. No hay
//! broker externo: la cola es un canal en proceso.
//! =================================================================

pub mod freshness_scanner;
pub mod http_probe_runner;
pub mod notification_dispatcher;
pub mod outbox_relay;
pub mod threshold_evaluator;

use chrono::{DateTime, Utc};
use monitor_domain::incident::Severity;

/// Una petición de aviso encolada por un detector, consumida por el
/// despachador. Mantiene sólo ids y datos escalares — nunca referencias
/// a objetos vivos, para poder cruzar el límite de una tarea `tokio::spawn`.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub tenant_id: String,
    /// `None` únicamente para un aviso agrupado sintetizado por el
    /// sondeo HTTP (§4.5); todo detector de incidente individual la fija.
    pub incident_id: Option<String>,
    pub severity: Severity,
    pub title: String,
    pub text: String,
    /// `true` si el aviso es una resolución: se salta el filtro de cooldown.
    pub resolved: bool,
    pub requested_at: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        incident_id: Option<String>,
        severity: Severity,
        title: impl Into<String>,
        text: impl Into<String>,
        resolved: bool,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            incident_id,
            severity,
            title: title.into(),
            text: text.into(),
            resolved,
            requested_at: Utc::now(),
        }
    }
}

pub type NotificationSender = tokio::sync::mpsc::Sender<NotificationRequest>;
pub type NotificationReceiver = tokio::sync::mpsc::Receiver<NotificationRequest>;
