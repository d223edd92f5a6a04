// [libs/infra/db/src/repositories/outbox.rs]
//! El outbox: cola durable de eventos de sincronización saliente. Este
//! repositorio es deliberadamente ciego al cálculo de backoff/jitter —
//! eso vive en el motor de relevo — y sólo persiste las transiciones de
//! estado que el motor decide.

use crate::errors::DbError;
use crate::util::{parse_ts, parse_ts_opt};
use crate::TursoClient;
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use monitor_domain::outbox::{OutboxEvent, OutboxStatus};
use tracing::instrument;

fn status_to_str(status: OutboxStatus) -> &'static str {
    match status {
        OutboxStatus::Pending => "pending",
        OutboxStatus::Delivering => "delivering",
        OutboxStatus::Delivered => "delivered",
        OutboxStatus::Failed => "failed",
    }
}

fn status_from_str(raw: &str) -> Result<OutboxStatus, DbError> {
    Ok(match raw {
        "pending" => OutboxStatus::Pending,
        "delivering" => OutboxStatus::Delivering,
        "delivered" => OutboxStatus::Delivered,
        "failed" => OutboxStatus::Failed,
        other => return Err(DbError::MappingError(format!("unknown outbox status '{other}'"))),
    })
}

fn row_to_event(row: &Row) -> Result<OutboxEvent, DbError> {
    let payload_json = row.get::<String>(3)?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| DbError::MappingError(format!("bad outbox payload: {e}")))?;

    Ok(OutboxEvent {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        event_type: row.get::<String>(2)?,
        payload,
        status: status_from_str(&row.get::<String>(4)?)?,
        attempts: row.get::<i64>(5)? as i32,
        created_at: parse_ts(row.get::<String>(6)?)?,
        next_attempt_at: parse_ts(row.get::<String>(7)?)?,
        delivered_at: parse_ts_opt(row.get::<Option<String>>(8)?)?,
        last_error: row.get::<Option<String>>(9)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, tenant_id, event_type, payload, status, attempts, created_at, next_attempt_at, delivered_at, last_error";

#[derive(Clone)]
pub struct OutboxRepository {
    database_client: TursoClient,
}

impl OutboxRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self, payload))]
    pub async fn save_event(
        &self,
        tenant_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<String, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| DbError::MappingError(format!("cannot serialize payload: {e}")))?;

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO outbox_events (id, tenant_id, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
                params![id.clone(), tenant_id, event_type, payload_json],
            )
            .await?;
        Ok(id)
    }

    /// Eventos `pending` cuyo `next_attempt_at` ya venció, listos para un
    /// nuevo intento de entrega.
    #[instrument(skip(self))]
    pub async fn due_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM outbox_events
                     WHERE status = 'pending' AND next_attempt_at <= CURRENT_TIMESTAMP
                     ORDER BY next_attempt_at LIMIT ?1"
                ),
                params![limit],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Marca el evento como `delivering` e incrementa `attempts`, sólo si
    /// seguía `pending`. Una fila afectada igual a 0 indica que otro
    /// worker ya lo reclamó.
    #[instrument(skip(self))]
    pub async fn mark_delivering(&self, event_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE outbox_events SET status = 'delivering', attempts = attempts + 1
                 WHERE id = ?1 AND status = 'pending'",
                params![event_id],
            )
            .await?;
        Ok(affected > 0)
    }

    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, event_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE outbox_events SET status = 'delivered', delivered_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![event_id],
            )
            .await?;
        Ok(())
    }

    /// Reprograma el evento a `pending` con el siguiente intento en
    /// `next_attempt_at`, registrando `error`. `attempts` ya fue
    /// incrementado por `mark_delivering` al reclamarlo.
    #[instrument(skip(self, error))]
    pub async fn schedule_retry(
        &self,
        event_id: &str,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE outbox_events SET status = 'pending',
                 next_attempt_at = ?2, last_error = ?3 WHERE id = ?1",
                params![event_id, next_attempt_at.to_rfc3339(), error],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, error))]
    pub async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE outbox_events SET status = 'failed', last_error = ?2
                 WHERE id = ?1",
                params![event_id, error],
            )
            .await?;
        Ok(())
    }
}
