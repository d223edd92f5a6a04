// [libs/infra/db/src/repositories/notification_ledger.rs]
//! El libro de notificaciones: cada intento de aviso hacia un proveedor
//! externo (o marcador técnico de supresión) queda registrado aquí. El
//! cooldown entre avisos para un mismo incidente se decide releyendo
//! este libro, nunca con temporizadores en memoria.

use crate::errors::DbError;
use crate::util::{parse_ts, parse_ts_opt};
use crate::TursoClient;
use chrono::{DateTime, Utc};
use libsql::{params, Row};
use monitor_domain::notification_log::{
    truncate_log_text, NotificationLogEntry, NotificationProvider, NotificationStatus,
};
use tracing::instrument;

fn provider_to_str(provider: NotificationProvider) -> &'static str {
    match provider {
        NotificationProvider::Chat => "chat",
        NotificationProvider::Email => "email",
        NotificationProvider::Grace => "grace",
        NotificationProvider::Cooldown => "cooldown",
    }
}

fn provider_from_str(raw: &str) -> Result<NotificationProvider, DbError> {
    Ok(match raw {
        "chat" => NotificationProvider::Chat,
        "email" => NotificationProvider::Email,
        "grace" => NotificationProvider::Grace,
        "cooldown" => NotificationProvider::Cooldown,
        other => return Err(DbError::MappingError(format!("unknown provider '{other}'"))),
    })
}

fn status_to_str(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Success => "success",
        NotificationStatus::Failed => "failed",
        NotificationStatus::SkippedCooldown => "skipped_cooldown",
        NotificationStatus::SkippedGrace => "skipped_grace",
    }
}

fn status_from_str(raw: &str) -> Result<NotificationStatus, DbError> {
    Ok(match raw {
        "pending" => NotificationStatus::Pending,
        "success" => NotificationStatus::Success,
        "failed" => NotificationStatus::Failed,
        "skipped_cooldown" => NotificationStatus::SkippedCooldown,
        "skipped_grace" => NotificationStatus::SkippedGrace,
        other => return Err(DbError::MappingError(format!("unknown notification status '{other}'"))),
    })
}

const SELECT_COLUMNS: &str =
    "id, tenant_id, incident_id, provider, recipient, status, message, error, created_at, sent_at, read";

fn row_to_entry(row: &Row) -> Result<NotificationLogEntry, DbError> {
    Ok(NotificationLogEntry {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        incident_id: row.get::<Option<String>>(2)?,
        provider: provider_from_str(&row.get::<String>(3)?)?,
        recipient: row.get::<Option<String>>(4)?,
        status: status_from_str(&row.get::<String>(5)?)?,
        message: row.get::<Option<String>>(6)?,
        error: row.get::<Option<String>>(7)?,
        created_at: parse_ts(row.get::<String>(8)?)?,
        sent_at: parse_ts_opt(row.get::<Option<String>>(9)?)?,
        read: row.get::<i64>(10)? != 0,
    })
}

#[derive(Clone)]
pub struct NotificationLedgerRepository {
    database_client: TursoClient,
}

impl NotificationLedgerRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Asienta un intento de notificación. `incident_id` es `None` para un
    /// aviso agrupado (§4.5). `sent_at` sólo se fija aquí cuando
    /// `status == Success`; para los demás estados queda nulo.
    #[instrument(skip(self, message, error))]
    pub async fn record(
        &self,
        tenant_id: &str,
        incident_id: Option<&str>,
        provider: NotificationProvider,
        recipient: Option<&str>,
        status: NotificationStatus,
        message: Option<String>,
        error: Option<String>,
    ) -> Result<NotificationLogEntry, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let message = message.map(|m| truncate_log_text(&m));
        let error = error.map(|e| truncate_log_text(&e));
        let sent_at = matches!(status, NotificationStatus::Success).then(|| Utc::now().to_rfc3339());

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO notification_log
                    (id, tenant_id, incident_id, provider, recipient, status, message, error, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.clone(),
                    tenant_id,
                    incident_id,
                    provider_to_str(provider),
                    recipient,
                    status_to_str(status),
                    message,
                    error,
                    sent_at
                ],
            )
            .await?;

        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM notification_log WHERE id = ?1"),
                params![id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("notification log entry vanished".into()))?;
        row_to_entry(&row)
    }

    /// Última notificación exitosa enviada para un incidente, excluyendo
    /// los proveedores técnicos (`grace`/`cooldown`): el cooldown nunca se
    /// calcula contra un marcador de supresión, sólo contra un envío real.
    #[instrument(skip(self))]
    pub async fn last_success_at(&self, incident_id: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT sent_at, provider FROM notification_log
                 WHERE incident_id = ?1 AND status = 'success'
                 ORDER BY sent_at DESC",
                params![incident_id],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            let provider = provider_from_str(&row.get::<String>(1)?)?;
            if provider.is_technical() {
                continue;
            }
            let Some(sent_at) = row.get::<Option<String>>(0)? else { continue };
            return Ok(Some(parse_ts(sent_at)?));
        }
        Ok(None)
    }

    /// Última notificación exitosa enviada a cualquier incidente del
    /// tenant, usada por el agrupamiento del sondeo HTTP (§4.5) para
    /// decidir si un lote de avisos cae dentro de la misma ventana.
    #[instrument(skip(self))]
    pub async fn last_success_at_for_tenant(&self, tenant_id: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT sent_at, provider FROM notification_log
                 WHERE tenant_id = ?1 AND status = 'success'
                 ORDER BY sent_at DESC",
                params![tenant_id],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            let provider = provider_from_str(&row.get::<String>(1)?)?;
            if provider.is_technical() {
                continue;
            }
            let Some(sent_at) = row.get::<Option<String>>(0)? else { continue };
            return Ok(Some(parse_ts(sent_at)?));
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        unread_only: bool,
    ) -> Result<Vec<NotificationLogEntry>, DbError> {
        let connection = self.database_client.get_connection()?;
        let sql = if unread_only {
            format!(
                "SELECT {SELECT_COLUMNS} FROM notification_log
                 WHERE tenant_id = ?1 AND read = 0 ORDER BY created_at DESC"
            )
        } else {
            format!("SELECT {SELECT_COLUMNS} FROM notification_log WHERE tenant_id = ?1 ORDER BY created_at DESC")
        };

        let mut rows = connection.query(&sql, params![tenant_id]).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, tenant_id: &str, notification_id: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE notification_log SET read = 1 WHERE id = ?1 AND tenant_id = ?2",
                params![notification_id, tenant_id],
            )
            .await?;
        Ok(affected > 0)
    }
}
