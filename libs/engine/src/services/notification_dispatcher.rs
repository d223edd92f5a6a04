// [libs/engine/src/services/notification_dispatcher.rs]
//! =================================================================
//! APARATO: NOTIFICATION DISPATCHER (C6) (V1.0)
//! CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2)
//! RESPONSABILIDAD: VALIDACIÓN, COOLDOWN Y ENVÍO DE AVISOS SALIENTES
//!
//! Orden de comprobaciones por petición: validar payload, resolver
//! proveedores configurados para el tenant, aplicar el portón de
//! cooldown (leído siempre del libro, nunca de memoria), enviar, y
//! asentar el resultado. Un fallo transitorio de transporte se coloca
//! en el outbox para que C7 lo reintente con la misma tabla de backoff.
//! =================================================================

use crate::errors::EngineError;
use crate::services::NotificationRequest;
use chrono::Utc;
use monitor_db::repositories::{NotificationLedgerRepository, OutboxRepository, TenantSettingsRepository};
use monitor_domain::notification_log::{NotificationProvider, NotificationStatus};
use monitor_notification::{ChatNotification, ChatProvider, ChatWebhookClient, DispatchError, EmailNotification};
use serde_json::json;
use std::time::Duration;
use tracing::{instrument, warn};

pub struct NotificationDispatcher {
    ledger: NotificationLedgerRepository,
    tenant_settings: TenantSettingsRepository,
    outbox: OutboxRepository,
    http_client: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new(
        ledger: NotificationLedgerRepository,
        tenant_settings: TenantSettingsRepository,
        outbox: OutboxRepository,
        request_timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { ledger, tenant_settings, outbox, http_client }
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, incident_id = ?request.incident_id))]
    pub async fn dispatch(&self, request: &NotificationRequest) -> Result<(), EngineError> {
        if request.title.trim().is_empty() || request.text.trim().is_empty() {
            return Err(EngineError::ValidationError("notification title/text cannot be empty".into()));
        }

        let settings = self.tenant_settings.get(&request.tenant_id).await?;
        let mut providers: Vec<(NotificationProvider, Option<String>)> = Vec::new();
        if settings.chat_webhook_url.is_some() {
            providers.push((NotificationProvider::Chat, None));
        }
        if let Some(email) = settings.notification_email.clone() {
            providers.push((NotificationProvider::Email, Some(email)));
        }

        if providers.is_empty() {
            warn!(tenant_id = %request.tenant_id, "no notification provider configured, dropping request");
            return Err(EngineError::Conflict("no notification provider configured for tenant".into()));
        }

        if !request.resolved {
            if let Some(incident_id) = &request.incident_id {
                if let Some(last_success) = self.ledger.last_success_at(incident_id).await? {
                    let elapsed = Utc::now() - last_success;
                    if elapsed < chrono::Duration::seconds(settings.reminder_sec) {
                        for (provider, recipient) in &providers {
                            self.ledger
                                .record(
                                    &request.tenant_id,
                                    Some(incident_id),
                                    *provider,
                                    recipient.as_deref(),
                                    NotificationStatus::SkippedCooldown,
                                    None,
                                    None,
                                )
                                .await?;
                        }
                        return Ok(());
                    }
                }
            }
        }

        // Each configured provider is attempted independently — a failing
        // chat webhook must never skip a configured email send for the same
        // request, or vice versa. Collect results instead of short-circuiting
        // the loop with `?`; the first failure (if any) is what's returned
        // to the caller, after every provider has had its own attempt.
        let mut first_failure: Option<EngineError> = None;
        for (provider, recipient) in providers {
            self.ledger
                .record(
                    &request.tenant_id,
                    request.incident_id.as_deref(),
                    provider,
                    recipient.as_deref(),
                    NotificationStatus::Pending,
                    None,
                    None,
                )
                .await?;

            let outcome = match provider {
                NotificationProvider::Chat => {
                    self.send_chat(request, settings.chat_webhook_url.as_deref().unwrap()).await
                }
                NotificationProvider::Email => {
                    self.send_email(request, recipient.as_deref().unwrap_or_default()).await
                }
                NotificationProvider::Grace | NotificationProvider::Cooldown => unreachable!(
                    "technical providers are never selected for an external send"
                ),
            };

            if let Err(e) = outcome {
                warn!(tenant_id = %request.tenant_id, provider = ?provider, error = %e, "provider send failed, continuing with remaining providers");
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Asienta un marcador técnico (no un envío real) para que quede
    /// constancia del motivo de supresión en el libro de notificaciones.
    #[instrument(skip(self))]
    pub async fn record_suppressed(
        &self,
        tenant_id: &str,
        incident_id: Option<&str>,
        provider: NotificationProvider,
        status: NotificationStatus,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.ledger
            .record(tenant_id, incident_id, provider, None, status, None, Some(reason.to_string()))
            .await?;
        Ok(())
    }

    async fn send_chat(&self, request: &NotificationRequest, webhook_url: &str) -> Result<(), EngineError> {
        let client = ChatWebhookClient::new(self.http_client.clone(), webhook_url.to_string());
        let notification = ChatNotification { text: request.text.clone() };

        match client.send(&notification).await {
            Ok(outcome) => {
                self.ledger
                    .record(
                        &request.tenant_id,
                        request.incident_id.as_deref(),
                        NotificationProvider::Chat,
                        None,
                        NotificationStatus::Success,
                        outcome.response_snippet.or_else(|| Some(request.text.clone())),
                        None,
                    )
                    .await?;
                Ok(())
            }
            Err(DispatchError::Transient(reason)) => {
                self.ledger
                    .record(
                        &request.tenant_id,
                        request.incident_id.as_deref(),
                        NotificationProvider::Chat,
                        None,
                        NotificationStatus::Failed,
                        None,
                        Some(reason.clone()),
                    )
                    .await?;
                self.enqueue_retry(request, "chat", &reason).await?;
                Err(EngineError::Transient(reason))
            }
            Err(DispatchError::Permanent(reason)) => {
                self.ledger
                    .record(
                        &request.tenant_id,
                        request.incident_id.as_deref(),
                        NotificationProvider::Chat,
                        None,
                        NotificationStatus::Failed,
                        None,
                        Some(reason.clone()),
                    )
                    .await?;
                Err(EngineError::Fatal(reason))
            }
        }
    }

    /// No hay proveedor SMTP real conectado (ver DESIGN.md): el correo se
    /// registra como entregado de forma lógica en el libro, a la espera
    /// de que un transporte real se enchufe detrás de este mismo punto.
    async fn send_email(&self, request: &NotificationRequest, recipient: &str) -> Result<(), EngineError> {
        let email = EmailNotification {
            to: recipient.to_string(),
            subject: request.title.clone(),
            body: request.text.clone(),
        };
        self.ledger
            .record(
                &request.tenant_id,
                request.incident_id.as_deref(),
                NotificationProvider::Email,
                Some(recipient),
                NotificationStatus::Success,
                Some(email.body),
                None,
            )
            .await?;
        Ok(())
    }

    async fn enqueue_retry(&self, request: &NotificationRequest, provider: &str, error: &str) -> Result<(), EngineError> {
        let payload = json!({
            "tenant_id": request.tenant_id,
            "incident_id": request.incident_id,
            "severity": request.severity,
            "title": request.title,
            "text": request.text,
            "resolved": request.resolved,
            "provider": provider,
            "last_error": error,
        });
        self.outbox.save_event(&request.tenant_id, "notification_retry", &payload).await?;
        Ok(())
    }
}
