// [libs/domain/notification/src/lib.rs]
//! =================================================================
//! APARATO: HERALD NOTIFICATION ENGINE (V2.0)
//! CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
//! RESPONSABILIDAD: CONTRATOS DE DESPACHO Y RASTRO DE AVISOS
//!
//! Define la gramática para los avisos que el despachador envía a los
//! proveedores externos (chat, email) a raíz de un incidente abierto
//! o resuelto, y el resultado tipado de cada intento.
//! =================================================================

use chrono::{DateTime, Utc};
use monitor_domain::incident::{Incident, IncidentStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mensaje listo para enviar a un canal de chat compatible con Slack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatNotification {
    pub text: String,
}

impl ChatNotification {
    /// Construye el mensaje de aviso para un incidente, según si se
    /// abrió o se resolvió.
    pub fn for_incident(incident: &Incident) -> Self {
        let verb = match incident.status {
            IncidentStatus::Open => "OPENED",
            IncidentStatus::Resolved => "RESOLVED",
        };
        let text = format!(
            "[{:?}] Incident #{} {}: {}",
            incident.severity, incident.incident_number, verb, incident.title
        );
        Self { text }
    }
}

/// Resultado de un intento de despacho hacia un proveedor externo.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub delivered_at: DateTime<Utc>,
    pub response_snippet: Option<String>,
}

/// Errores que puede producir un intento de despacho. `Transient` señala
/// al llamador que el fallo es candidato a reintento (outbox-style);
/// `Permanent` no lo es.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

/// Un canal de salida capaz de entregar un aviso de chat. La interfaz es
/// mínima a propósito: el despachador (en monitor-engine) decide cuándo
/// llamarla; esta capa sólo sabe hablar con el proveedor externo.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn send(&self, notification: &ChatNotification) -> Result<DispatchOutcome, DispatchError>;
}

/// Envía avisos a un webhook compatible con Slack (`{"text": "..."}`).
/// Un 2xx se considera entrega exitosa; 4xx es permanente (la URL o el
/// payload están mal, reintentar no ayuda) y 5xx/timeouts son transitorios.
pub struct ChatWebhookClient {
    http_client: reqwest::Client,
    webhook_url: String,
}

impl ChatWebhookClient {
    pub fn new(http_client: reqwest::Client, webhook_url: String) -> Self {
        Self { http_client, webhook_url }
    }
}

#[async_trait::async_trait]
impl ChatProvider for ChatWebhookClient {
    async fn send(&self, notification: &ChatNotification) -> Result<DispatchOutcome, DispatchError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    DispatchError::Transient(e.to_string())
                } else {
                    DispatchError::Permanent(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(500).collect();

        if status.is_success() {
            Ok(DispatchOutcome {
                delivered_at: Utc::now(),
                response_snippet: Some(snippet),
            })
        } else if status.is_server_error() {
            Err(DispatchError::Transient(format!("webhook returned {status}: {snippet}")))
        } else {
            Err(DispatchError::Permanent(format!("webhook returned {status}: {snippet}")))
        }
    }
}

/// Aviso por email. No hay proveedor SMTP real conectado (ver DESIGN.md):
/// el destinatario y el cuerpo del correo quedan persistidos en el libro
/// de notificaciones como un envío "lógico" exitoso, a la espera de que
/// un operador conecte un proveedor transaccional (SES, Postmark) detrás
/// de este mismo contrato.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailNotification {
    pub fn for_incident(incident: &Incident, recipient: &str) -> Self {
        let verb = match incident.status {
            IncidentStatus::Open => "opened",
            IncidentStatus::Resolved => "resolved",
        };
        Self {
            to: recipient.to_string(),
            subject: format!("Incident #{} {}", incident.incident_number, verb),
            body: format!(
                "[{:?}] {}\n\n{}",
                incident.severity,
                incident.title,
                incident.description.as_deref().unwrap_or("")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_domain::incident::Severity;

    fn incident(status: IncidentStatus, severity: Severity) -> Incident {
        Incident {
            id: "inc1".into(),
            tenant_id: "tenant1".into(),
            incident_number: 42,
            kind: monitor_domain::incident::IncidentKind::Breach,
            dedup_key: "breach:mi:metric-1".into(),
            title: "threshold breach on cpu.load".into(),
            description: Some("current_value=99.0".into()),
            status,
            severity,
            machine_id: None,
            metric_instance_id: Some("metric-1".into()),
            http_target_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn chat_message_names_the_verb_and_incident_number_for_an_open_incident() {
        let message = ChatNotification::for_incident(&incident(IncidentStatus::Open, Severity::Critical));
        assert!(message.text.contains("OPENED"));
        assert!(message.text.contains("#42"));
        assert!(message.text.contains("threshold breach on cpu.load"));
    }

    #[test]
    fn chat_message_names_the_verb_for_a_resolved_incident() {
        let message = ChatNotification::for_incident(&incident(IncidentStatus::Resolved, Severity::Warning));
        assert!(message.text.contains("RESOLVED"));
        assert!(!message.text.contains("OPENED"));
    }

    #[test]
    fn email_notification_carries_the_recipient_and_describes_the_incident() {
        let email = EmailNotification::for_incident(&incident(IncidentStatus::Open, Severity::Info), "ops@acme.test");
        assert_eq!(email.to, "ops@acme.test");
        assert!(email.subject.contains("opened"));
        assert!(email.body.contains("threshold breach on cpu.load"));
        assert!(email.body.contains("current_value=99.0"));
    }

    #[test]
    fn email_body_tolerates_a_missing_description() {
        let mut inc = incident(IncidentStatus::Resolved, Severity::Warning);
        inc.description = None;
        let email = EmailNotification::for_incident(&inc, "ops@acme.test");
        assert!(email.subject.contains("resolved"));
        assert!(email.body.ends_with('\n'));
    }
}
