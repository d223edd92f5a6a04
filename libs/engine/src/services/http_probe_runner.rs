// [libs/engine/src/services/http_probe_runner.rs]
//! =================================================================
//! APARATO: HTTP PROBE RUNNER (C5) (V1.0)
//! CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2)
//! RESPONSABILIDAD: SONDEO PERIÓDICO DE ENDPOINTS Y CICLO HTTP_FAILURE
//!
//! Un fallo de transporte se representa como `status=0` con un mensaje
//! de error, nunca como ausencia de resultado. El veredicto de
//! aceptación se persiste siempre; `last_state_change_at` sólo avanza
//! cuando el veredicto difiere del sondeo anterior, y ancla tanto la
//! ventana de gracia por tenant como el agrupamiento posterior.
//! =================================================================

use crate::clock::ProcessClock;
use crate::errors::EngineError;
use crate::services::{NotificationRequest, NotificationSender};
use chrono::Utc;
use monitor_db::repositories::incidents::{dedup_key_for, NewIncident};
use monitor_db::repositories::{
    HttpTargetRepository, IncidentRepository, NotificationLedgerRepository, TenantSettingsRepository,
};
use monitor_domain::http_target::HttpTarget;
use monitor_domain::incident::Severity;
use monitor_domain::notification_log::{NotificationProvider, NotificationStatus};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{instrument, warn};

pub struct HttpProbeRunner {
    targets: HttpTargetRepository,
    incidents: IncidentRepository,
    tenant_settings: TenantSettingsRepository,
    ledger: NotificationLedgerRepository,
    notifications: NotificationSender,
    http_client: reqwest::Client,
    clock: ProcessClock,
    global_startup_grace_sec: i64,
}

struct Buffered {
    incident_id: String,
    severity: Severity,
    title: String,
    text: String,
}

impl HttpProbeRunner {
    pub fn new(
        targets: HttpTargetRepository,
        incidents: IncidentRepository,
        tenant_settings: TenantSettingsRepository,
        ledger: NotificationLedgerRepository,
        notifications: NotificationSender,
        clock: ProcessClock,
        global_startup_grace_sec: i64,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            targets,
            incidents,
            tenant_settings,
            ledger,
            notifications,
            http_client,
            clock,
            global_startup_grace_sec,
        }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<(), EngineError> {
        let now = Utc::now();
        let all_active = self.targets.list_active().await?;
        let due: Vec<HttpTarget> = all_active.into_iter().filter(|t| t.is_due(now)).collect();

        let mut by_tenant: HashMap<String, Vec<HttpTarget>> = HashMap::new();
        for target in due {
            by_tenant.entry(target.tenant_id.clone()).or_default().push(target);
        }

        for (tenant_id, targets) in by_tenant {
            if let Err(e) = self.run_tenant(&tenant_id, targets).await {
                warn!(tenant_id = %tenant_id, error = %e, "http probe pass failed for tenant, continuing");
            }
        }
        Ok(())
    }

    async fn run_tenant(&self, tenant_id: &str, targets: Vec<HttpTarget>) -> Result<(), EngineError> {
        let settings = self.tenant_settings.get(tenant_id).await?;
        let suppress_open = self.clock.within_startup_grace(Utc::now(), self.global_startup_grace_sec);

        let mut opens_or_reminders = Vec::new();
        let mut resolves = Vec::new();

        for target in targets {
            self.probe_one(tenant_id, &target, suppress_open, settings.grace_period_sec, settings.reminder_sec, &mut opens_or_reminders, &mut resolves)
                .await?;
        }

        self.dispatch_bucket(tenant_id, opens_or_reminders, false, settings.grouping_enabled, settings.grouping_window_sec)
            .await?;
        self.dispatch_bucket(tenant_id, resolves, true, settings.grouping_enabled, settings.grouping_window_sec)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn probe_one(
        &self,
        tenant_id: &str,
        target: &HttpTarget,
        suppress_open: bool,
        grace_period_sec: i64,
        reminder_sec: i64,
        opens_or_reminders: &mut Vec<Buffered>,
        resolves: &mut Vec<Buffered>,
    ) -> Result<(), EngineError> {
        let (status, latency_ms, error) = self.issue_probe(target).await;
        let accepted = status != 0 && target.accepts(status);
        let previous_accepted = target.last_status.map(|s| target.accepts(s)).unwrap_or(true);
        let state_changed = accepted != previous_accepted || target.last_status.is_none();
        let now = Utc::now();
        // On a fresh flip `last_state_change_at` is about to be bumped to
        // `now` by the write below; the grace window must anchor on that
        // just-bumped value, not the stale one still sitting on `target`
        // (which is either absent on a first-ever observation or holds the
        // timestamp of the *previous, opposite* transition).
        let state_change_anchor = state_change_anchor(state_changed, now, target.last_state_change_at);

        self.targets
            .record_probe_result(&target.id, status, latency_ms, error.as_deref(), state_changed)
            .await?;

        let dedup_key = dedup_key_for(monitor_domain::incident::IncidentKind::HttpFailure, &target.id);

        if accepted {
            if let Some(resolved) = self.incidents.resolve_open_by_dedup_key(tenant_id, &dedup_key).await? {
                resolves.push(Buffered {
                    incident_id: resolved.id,
                    severity: Severity::Info,
                    title: format!("{} recovered", target.url),
                    text: format!("{} is responding normally again (status {status})", target.url),
                });
            }
            return Ok(());
        }

        if suppress_open {
            return Ok(());
        }

        if within_grace_window(state_change_anchor, now, grace_period_sec) {
            self.ledger
                .record(
                    tenant_id,
                    None,
                    NotificationProvider::Grace,
                    None,
                    NotificationStatus::SkippedGrace,
                    None,
                    Some(format!("{} within per-tenant grace window", target.url)),
                )
                .await?;
            return Ok(());
        }

        let outcome = self
            .incidents
            .open(NewIncident {
                tenant_id,
                kind: monitor_domain::incident::IncidentKind::HttpFailure,
                scope_id: &target.id,
                title: format!("{} is failing checks", target.url),
                description: error.clone(),
                severity: Severity::Warning,
                machine_id: None,
                metric_instance_id: None,
                http_target_id: Some(&target.id),
            })
            .await?;

        let cooldown_expired = match self.ledger.last_success_at(&outcome.incident.id).await? {
            Some(last) => Utc::now() - last >= chrono::Duration::seconds(reminder_sec),
            None => true,
        };

        if outcome.created || cooldown_expired {
            opens_or_reminders.push(Buffered {
                incident_id: outcome.incident.id,
                severity: Severity::Warning,
                title: format!("{} is failing checks", target.url),
                text: format!("{} returned status {status}: {}", target.url, error.as_deref().unwrap_or("rejected")),
            });
        }
        Ok(())
    }

    async fn issue_probe(&self, target: &HttpTarget) -> (i32, i64, Option<String>) {
        let method = match target.method {
            monitor_domain::http_target::HttpMethod::Get => reqwest::Method::GET,
            monitor_domain::http_target::HttpMethod::Post => reqwest::Method::POST,
            monitor_domain::http_target::HttpMethod::Head => reqwest::Method::HEAD,
        };

        let started = Instant::now();
        let result = self
            .http_client
            .request(method, &target.url)
            .timeout(std::time::Duration::from_secs(target.timeout_sec as u64))
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(response) => (response.status().as_u16() as i32, latency_ms, None),
            Err(e) => {
                let message: String = e.to_string().chars().take(500).collect();
                (0, latency_ms, Some(message))
            }
        }
    }

    /// Colapsa N avisos simultáneos del mismo tenant en uno sólo cuando
    /// el agrupamiento está activo y hay más de un incidente en el lote;
    /// de lo contrario despacha individualmente. Las resoluciones
    /// saltan el portón de cooldown (son terminales) pero igual
    /// respetan el agrupamiento.
    async fn dispatch_bucket(
        &self,
        tenant_id: &str,
        bucket: Vec<Buffered>,
        resolved: bool,
        grouping_enabled: bool,
        grouping_window_sec: i64,
    ) -> Result<(), EngineError> {
        if bucket.is_empty() {
            return Ok(());
        }

        let within_grouping_window = match self.ledger.last_success_at_for_tenant(tenant_id).await {
            Ok(Some(last)) => Utc::now() - last < chrono::Duration::seconds(grouping_window_sec),
            _ => false,
        };

        if grouping_enabled && bucket.len() > 1 && within_grouping_window {
            let title = format!("{} HTTP targets {}", bucket.len(), if resolved { "recovered" } else { "failing" });
            let text = bucket.iter().map(|b| b.title.clone()).collect::<Vec<_>>().join("; ");
            let request = NotificationRequest::new(tenant_id, None, Severity::Warning, title, text, resolved);
            let _ = self.notifications.send(request).await;
            return Ok(());
        }

        for item in bucket {
            let request = NotificationRequest::new(
                tenant_id,
                Some(item.incident_id),
                item.severity,
                item.title,
                item.text,
                resolved,
            );
            let _ = self.notifications.send(request).await;
        }
        Ok(())
    }
}

/// El ancla de la ventana de gracia para este sondeo: `now` si el
/// veredicto aceptar/rechazar acaba de cambiar (incluida la primera
/// observación de un target, donde no hay transición previa que anclar),
/// o la marca de la transición anterior en cualquier otro caso.
fn state_change_anchor(
    state_changed: bool,
    now: chrono::DateTime<Utc>,
    previous_state_change_at: Option<chrono::DateTime<Utc>>,
) -> chrono::DateTime<Utc> {
    if state_changed {
        now
    } else {
        previous_state_change_at.unwrap_or(now)
    }
}

fn within_grace_window(anchor: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>, grace_period_sec: i64) -> bool {
    now - anchor < chrono::Duration::seconds(grace_period_sec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_down_transition_from_no_prior_observation_anchors_on_now() {
        let now = Utc::now();
        // first-ever observation: no previous state at all
        let anchor = state_change_anchor(true, now, None);
        assert_eq!(anchor, now);
        assert!(within_grace_window(anchor, now, 300));
    }

    #[test]
    fn fresh_down_transition_from_a_prior_up_state_anchors_on_now_not_the_stale_timestamp() {
        let now = Utc::now();
        // the target was last known up a long time ago; this probe is the
        // one causing the down flip, so the anchor must be `now`, not the
        // ancient (opposite-direction) timestamp still on the row.
        let stale_previous_transition = now - chrono::Duration::seconds(10_000);
        let anchor = state_change_anchor(true, now, Some(stale_previous_transition));
        assert_eq!(anchor, now);
        assert!(within_grace_window(anchor, now, 300));
    }

    #[test]
    fn a_fresh_transition_always_falls_inside_any_positive_grace_window() {
        let now = Utc::now();
        let anchor = state_change_anchor(true, now, None);
        assert!(within_grace_window(anchor, now, 1));
    }

    #[test]
    fn an_unchanged_down_state_anchors_on_the_recorded_transition_timestamp() {
        let now = Utc::now();
        let transitioned_at = now - chrono::Duration::seconds(120);
        let anchor = state_change_anchor(false, now, Some(transitioned_at));
        assert_eq!(anchor, transitioned_at);
        assert!(within_grace_window(anchor, now, 300));
        assert!(!within_grace_window(anchor, now, 60));
    }

    #[test]
    fn an_unchanged_down_state_outside_the_grace_window_is_not_suppressed() {
        let now = Utc::now();
        let transitioned_at = now - chrono::Duration::seconds(600);
        let anchor = state_change_anchor(false, now, Some(transitioned_at));
        assert!(!within_grace_window(anchor, now, 300));
    }

    #[test]
    fn an_unchanged_state_with_no_recorded_transition_falls_back_to_now() {
        // defensive fallback for a state that should be unreachable in
        // practice (a first observation always reports `state_changed`).
        let now = Utc::now();
        let anchor = state_change_anchor(false, now, None);
        assert_eq!(anchor, now);
    }
}
