// [libs/engine/src/services/outbox_relay.rs]
//! =================================================================
//! APARATO: OUTBOX RELAY (C7) (V1.0)
//! CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2)
//! RESPONSABILIDAD: RECLAMO Y ENTREGA EN DOS FASES DE EVENTOS DURABLES
//!
//! Fase de reclamo (claim) y fase de entrega (deliver) separadas: el
//! cálculo de backoff/jitter vive aquí, no en el repositorio. El único
//! tipo de evento conocido hoy es `notification_retry`, encolado por el
//! despachador (C6) cuando un envío falla de forma transitoria.
//! =================================================================

use crate::errors::EngineError;
use crate::services::{NotificationRequest, NotificationSender};
use chrono::Utc;
use monitor_db::repositories::OutboxRepository;
use monitor_domain::incident::Severity;
use monitor_domain::outbox::OutboxEvent;
use rand::Rng;
use tracing::{instrument, warn};

pub struct OutboxRelay {
    outbox: OutboxRepository,
    notifications: NotificationSender,
    backoffs_sec: Vec<u64>,
    jitter_pct: f64,
    max_attempts: u32,
}

impl OutboxRelay {
    pub fn new(
        outbox: OutboxRepository,
        notifications: NotificationSender,
        backoffs_sec: Vec<u64>,
        jitter_pct: f64,
        max_attempts: u32,
    ) -> Self {
        Self { outbox, notifications, backoffs_sec, jitter_pct: jitter_pct.clamp(0.0, 0.9), max_attempts }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self, batch_size: i64) -> Result<(), EngineError> {
        let due = self.outbox.due_events(batch_size).await?;
        for event in due {
            if let Err(e) = self.deliver_one(event).await {
                warn!(error = %e, "outbox delivery failed for event, continuing batch");
            }
        }
        Ok(())
    }

    async fn deliver_one(&self, event: OutboxEvent) -> Result<(), EngineError> {
        let claimed = self.outbox.mark_delivering(&event.id).await?;
        if !claimed {
            return Ok(());
        }

        match self.handle(&event).await {
            Ok(()) => {
                self.outbox.mark_delivered(&event.id).await?;
            }
            Err(error) => {
                // `event.attempts` is the pre-claim count: `mark_delivering`
                // bumped the row in the database but never refreshed this
                // in-memory struct, so every use below applies the `+1`
                // correction itself rather than trusting the stale field.
                if event.attempts + 1 >= self.max_attempts as i32 {
                    warn!(event_id = %event.id, attempts = event.attempts + 1, "outbox event exhausted retries, marking failed");
                    self.outbox.mark_failed(&event.id, &error.to_string()).await?;
                } else {
                    let next_attempt_at = Utc::now() + chrono::Duration::seconds(self.backoff_for(event.attempts + 1));
                    self.outbox.schedule_retry(&event.id, next_attempt_at, &error.to_string()).await?;
                }
            }
        }
        Ok(())
    }

    /// Despacha el evento según su `event_type`. Hoy sólo existe
    /// `notification_retry`; otros tipos se registran como entregados
    /// sin acción, de modo que agregar un nuevo tipo de evento no
    /// requiera tocar el reclamo ni el cálculo de backoff.
    async fn handle(&self, event: &OutboxEvent) -> Result<(), EngineError> {
        match event.event_type.as_str() {
            "notification_retry" => self.retry_notification(event).await,
            other => {
                warn!(event_type = other, "unknown outbox event type, marking delivered as a no-op");
                Ok(())
            }
        }
    }

    async fn retry_notification(&self, event: &OutboxEvent) -> Result<(), EngineError> {
        let tenant_id = event
            .payload
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Fatal("notification_retry payload missing tenant_id".into()))?;
        let incident_id = event.payload.get("incident_id").and_then(|v| v.as_str()).map(str::to_string);
        let title = event.payload.get("title").and_then(|v| v.as_str()).unwrap_or_default();
        let text = event.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        let resolved = event.payload.get("resolved").and_then(|v| v.as_bool()).unwrap_or(false);

        let request = NotificationRequest::new(tenant_id, incident_id, Severity::Warning, title, text, resolved);
        self.notifications
            .send(request)
            .await
            .map_err(|_| EngineError::Transient("notification queue closed".into()))
    }

    /// Tabla de reintento indexada por `attempts - 1` (clampada a la
    /// última entrada), con jitter de ±`jitter_pct`.
    fn backoff_for(&self, attempts: i32) -> i64 {
        backoff_index(&self.backoffs_sec, attempts, self.jitter_pct, || {
            rand::thread_rng().gen_range(-1.0..=1.0)
        })
    }
}

/// Calcula el retraso de reintento para `attempts`, indexado a la tabla
/// `backoffs_sec` (clampada a la última entrada) con jitter de
/// ±`jitter_pct`. `unit_jitter` produce un valor en `[-1.0, 1.0]`,
/// inyectado para que el cálculo sea determinista bajo prueba.
fn backoff_index(backoffs_sec: &[u64], attempts: i32, jitter_pct: f64, unit_jitter: impl FnOnce() -> f64) -> i64 {
    let index = ((attempts - 1).max(0) as usize).min(backoffs_sec.len().saturating_sub(1));
    let base = *backoffs_sec.get(index).unwrap_or(&30) as f64;
    let jitter = unit_jitter() * jitter_pct;
    (base * (1.0 + jitter)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKOFFS: [u64; 5] = [30, 60, 120, 300, 600];

    #[test]
    fn backoff_indexes_by_attempts_minus_one_with_no_jitter() {
        assert_eq!(backoff_index(&BACKOFFS, 1, 0.2, || 0.0), 30);
        assert_eq!(backoff_index(&BACKOFFS, 2, 0.2, || 0.0), 60);
        assert_eq!(backoff_index(&BACKOFFS, 3, 0.2, || 0.0), 120);
        assert_eq!(backoff_index(&BACKOFFS, 4, 0.2, || 0.0), 300);
        assert_eq!(backoff_index(&BACKOFFS, 5, 0.2, || 0.0), 600);
    }

    #[test]
    fn backoff_clamps_to_the_last_entry_beyond_table_length() {
        assert_eq!(backoff_index(&BACKOFFS, 99, 0.2, || 0.0), 600);
    }

    #[test]
    fn backoff_clamps_attempts_below_one_to_the_first_entry() {
        assert_eq!(backoff_index(&BACKOFFS, 0, 0.2, || 0.0), 30);
        assert_eq!(backoff_index(&BACKOFFS, -3, 0.2, || 0.0), 30);
    }

    #[test]
    fn jitter_is_bounded_by_jitter_pct() {
        let with_max_positive_jitter = backoff_index(&BACKOFFS, 1, 0.2, || 1.0);
        let with_max_negative_jitter = backoff_index(&BACKOFFS, 1, 0.2, || -1.0);
        assert_eq!(with_max_positive_jitter, 36); // 30 * 1.2
        assert_eq!(with_max_negative_jitter, 24); // 30 * 0.8
    }

    /// Mirrors `deliver_one`'s retry-vs-fail decision without a live DB:
    /// `event.attempts` is already bumped by `mark_delivering`'s claim, so
    /// the attempt being evaluated is `attempts + 1`.
    fn should_give_up(attempts: i32, max_attempts: u32) -> bool {
        attempts + 1 >= max_attempts as i32
    }

    #[test]
    fn retries_while_under_the_attempt_cap() {
        assert!(!should_give_up(0, 5));
        assert!(!should_give_up(3, 5));
    }

    #[test]
    fn gives_up_once_the_attempt_cap_is_reached() {
        assert!(should_give_up(4, 5));
        assert!(should_give_up(10, 5));
    }

    #[test]
    fn a_max_attempts_of_one_fails_on_the_first_try() {
        assert!(should_give_up(0, 1));
    }
}
