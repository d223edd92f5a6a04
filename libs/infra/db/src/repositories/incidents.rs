// [libs/infra/db/src/repositories/incidents.rs]
//! =================================================================
//! APARATO: INCIDENT REPOSITORY (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
//! RESPONSABILIDAD: APERTURA Y RESOLUCIÓN ATÓMICA DE INCIDENTES
//!
//! `open()` es el único punto de escritura que puede crear un incidente.
//! La exclusión mutua no vive en el proceso: la descansa por completo en
//! el índice único parcial `idx_incidents_open_dedup` sobre
//! (tenant_id, dedup_key) WHERE status = 'open'. Si dos llamadas
//! concurrentes intentan abrir el mismo `dedup_key`, una gana la
//! inserción y la otra recibe la violación de restricción, deshace su
//! transacción y relee el incidente que ya quedó abierto.
//! =================================================================

use crate::errors::DbError;
use crate::util::parse_ts;
use crate::TursoClient;
use libsql::{params, Row};
use monitor_domain::incident::{Incident, IncidentKind, IncidentStatus, Severity};
use tracing::{instrument, warn};

pub fn dedup_key_for(kind: IncidentKind, scope_id: &str) -> String {
    match kind {
        IncidentKind::Breach => format!("breach:mi:{scope_id}"),
        IncidentKind::NoDataMetric => format!("no_data_metric:mi:{scope_id}"),
        IncidentKind::NoDataMachine => format!("no_data_machine:machine:{scope_id}"),
        IncidentKind::HttpFailure => format!("http_failure:http:{scope_id}"),
    }
}

fn kind_to_str(kind: IncidentKind) -> &'static str {
    match kind {
        IncidentKind::Breach => "breach",
        IncidentKind::NoDataMetric => "no_data_metric",
        IncidentKind::NoDataMachine => "no_data_machine",
        IncidentKind::HttpFailure => "http_failure",
    }
}

fn kind_from_str(raw: &str) -> Result<IncidentKind, DbError> {
    Ok(match raw {
        "breach" => IncidentKind::Breach,
        "no_data_metric" => IncidentKind::NoDataMetric,
        "no_data_machine" => IncidentKind::NoDataMachine,
        "http_failure" => IncidentKind::HttpFailure,
        other => return Err(DbError::MappingError(format!("unknown incident kind '{other}'"))),
    })
}

fn status_to_str(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Open => "open",
        IncidentStatus::Resolved => "resolved",
    }
}

fn status_from_str(raw: &str) -> Result<IncidentStatus, DbError> {
    Ok(match raw {
        "open" => IncidentStatus::Open,
        "resolved" => IncidentStatus::Resolved,
        other => return Err(DbError::MappingError(format!("unknown incident status '{other}'"))),
    })
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

fn severity_from_str(raw: &str) -> Result<Severity, DbError> {
    Ok(match raw {
        "info" => Severity::Info,
        "warning" => Severity::Warning,
        "critical" => Severity::Critical,
        other => return Err(DbError::MappingError(format!("unknown severity '{other}'"))),
    })
}

fn row_to_incident(row: &Row) -> Result<Incident, DbError> {
    Ok(Incident {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        incident_number: row.get::<i64>(2)?,
        kind: kind_from_str(&row.get::<String>(3)?)?,
        dedup_key: row.get::<String>(4)?,
        title: row.get::<String>(5)?,
        description: row.get::<Option<String>>(6)?,
        status: status_from_str(&row.get::<String>(7)?)?,
        severity: severity_from_str(&row.get::<String>(8)?)?,
        machine_id: row.get::<Option<String>>(9)?,
        metric_instance_id: row.get::<Option<String>>(10)?,
        http_target_id: row.get::<Option<String>>(11)?,
        created_at: parse_ts(row.get::<String>(12)?)?,
        updated_at: parse_ts(row.get::<String>(13)?)?,
        resolved_at: match row.get::<Option<String>>(14)? {
            Some(raw) => Some(parse_ts(raw)?),
            None => None,
        },
    })
}

const SELECT_COLUMNS: &str = "id, tenant_id, incident_number, kind, dedup_key, title, description, \
     status, severity, machine_id, metric_instance_id, http_target_id, created_at, updated_at, resolved_at";

/// Entrada mínima requerida para abrir un incidente.
pub struct NewIncident<'a> {
    pub tenant_id: &'a str,
    pub kind: IncidentKind,
    pub scope_id: &'a str,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub machine_id: Option<&'a str>,
    pub metric_instance_id: Option<&'a str>,
    pub http_target_id: Option<&'a str>,
}

/// Resultado de `open()`: si `created` es `false`, el incidente ya estaba
/// abierto y sólo se refrescó su `updated_at`.
pub struct OpenOutcome {
    pub incident: Incident,
    pub created: bool,
}

#[derive(Clone)]
pub struct IncidentRepository {
    database_client: TursoClient,
}

impl IncidentRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self, new_incident))]
    pub async fn open(&self, new_incident: NewIncident<'_>) -> Result<OpenOutcome, DbError> {
        let dedup_key = dedup_key_for(new_incident.kind, new_incident.scope_id);

        if let Some(existing) = self
            .find_open_by_dedup_key(new_incident.tenant_id, &dedup_key)
            .await?
        {
            self.touch(&existing.id).await?;
            let refreshed = self
                .find_by_id(&existing.id)
                .await?
                .ok_or(DbError::IncidentNotFound)?;
            return Ok(OpenOutcome { incident: refreshed, created: false });
        }

        let connection = self.database_client.get_connection()?;
        let id = uuid::Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO incident_sequences (tenant_id, last_value) VALUES (?1, 0)
                 ON CONFLICT(tenant_id) DO NOTHING",
                params![new_incident.tenant_id],
            )
            .await?;
        connection
            .execute(
                "UPDATE incident_sequences SET last_value = last_value + 1 WHERE tenant_id = ?1",
                params![new_incident.tenant_id],
            )
            .await?;
        let mut seq_rows = connection
            .query(
                "SELECT last_value FROM incident_sequences WHERE tenant_id = ?1",
                params![new_incident.tenant_id],
            )
            .await?;
        let incident_number = seq_rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("incident sequence row missing".into()))?
            .get::<i64>(0)?;

        let insert_result = connection
            .execute(
                "INSERT INTO incidents (
                    id, tenant_id, incident_number, kind, dedup_key, title, description,
                    status, severity, machine_id, metric_instance_id, http_target_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9, ?10, ?11)",
                params![
                    id.clone(),
                    new_incident.tenant_id,
                    incident_number,
                    kind_to_str(new_incident.kind),
                    dedup_key.clone(),
                    new_incident.title,
                    new_incident.description,
                    severity_to_str(new_incident.severity),
                    new_incident.machine_id,
                    new_incident.metric_instance_id,
                    new_incident.http_target_id
                ],
            )
            .await;

        match insert_result {
            Ok(_) => {
                let incident = self.find_by_id(&id).await?.ok_or(DbError::IncidentNotFound)?;
                Ok(OpenOutcome { incident, created: true })
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(
                    "concurrent opener won dedup_key {}, re-reading winning incident",
                    dedup_key
                );
                let winning = self
                    .find_open_by_dedup_key(new_incident.tenant_id, &dedup_key)
                    .await?
                    .ok_or(DbError::IncidentNotFound)?;
                Ok(OpenOutcome { incident: winning, created: false })
            }
            Err(e) => Err(DbError::QueryError(e)),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_open_by_dedup_key(
        &self,
        tenant_id: &str,
        dedup_key: &str,
    ) -> Result<Option<Incident>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM incidents
                     WHERE tenant_id = ?1 AND dedup_key = ?2 AND status = 'open'"
                ),
                params![tenant_id, dedup_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_incident(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, incident_id: &str) -> Result<Option<Incident>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM incidents WHERE id = ?1"),
                params![incident_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_incident(&row)?)),
            None => Ok(None),
        }
    }

    async fn touch(&self, incident_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE incidents SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![incident_id],
            )
            .await?;
        Ok(())
    }

    /// Resuelve el incidente abierto (si existe) con el `dedup_key` dado.
    /// Devuelve `None` si no había ninguno abierto.
    #[instrument(skip(self))]
    pub async fn resolve_open_by_dedup_key(
        &self,
        tenant_id: &str,
        dedup_key: &str,
    ) -> Result<Option<Incident>, DbError> {
        let Some(existing) = self.find_open_by_dedup_key(tenant_id, dedup_key).await? else {
            return Ok(None);
        };

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE incidents SET status = 'resolved', resolved_at = CURRENT_TIMESTAMP,
                 updated_at = CURRENT_TIMESTAMP WHERE id = ?1 AND status = 'open'",
                params![existing.id.clone()],
            )
            .await?;

        self.find_by_id(&existing.id).await
    }

    #[instrument(skip(self))]
    pub async fn list_open(&self, tenant_id: &str) -> Result<Vec<Incident>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM incidents
                     WHERE tenant_id = ?1 AND status = 'open' ORDER BY created_at DESC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(row_to_incident(&row)?);
        }
        Ok(incidents)
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self, tenant_id: &str) -> Result<Vec<Incident>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM incidents WHERE tenant_id = ?1 ORDER BY created_at DESC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(row_to_incident(&row)?);
        }
        Ok(incidents)
    }

    /// Resuelve todos los incidentes `NoDataMetric` abiertos de las
    /// métricas de una máquina, usado cuando se abre (o se resuelve) el
    /// incidente `NoDataMachine` que los engloba.
    #[instrument(skip(self))]
    pub async fn resolve_all_metric_nodata_for_machine(
        &self,
        tenant_id: &str,
        machine_id: &str,
    ) -> Result<u64, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "UPDATE incidents SET status = 'resolved', resolved_at = CURRENT_TIMESTAMP,
                 updated_at = CURRENT_TIMESTAMP
                 WHERE tenant_id = ?1 AND machine_id = ?2 AND kind = 'no_data_metric' AND status = 'open'",
                params![tenant_id, machine_id],
            )
            .await?;
        Ok(affected)
    }

    #[instrument(skip(self))]
    pub async fn list_open_machine_nodata(&self, tenant_id: &str) -> Result<Vec<Incident>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM incidents
                     WHERE tenant_id = ?1 AND kind = 'no_data_machine' AND status = 'open'"
                ),
                params![tenant_id],
            )
            .await?;

        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(row_to_incident(&row)?);
        }
        Ok(incidents)
    }

    /// Auto-resuelve incidentes de `Breach` abiertos cuya métrica ya es
    /// obsoleta (sin muestras nuevas) y cuya antigüedad supera `max_age_hours`.
    /// Evita que un incidente quede abierto para siempre cuando la métrica
    /// que lo originó simplemente dejó de existir.
    #[instrument(skip(self))]
    pub async fn auto_resolve_stale_breaches(
        &self,
        tenant_id: &str,
        max_age_hours: i64,
        staleness_sec: i64,
    ) -> Result<u64, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                &format!(
                    "UPDATE incidents SET status = 'resolved', resolved_at = CURRENT_TIMESTAMP,
                     updated_at = CURRENT_TIMESTAMP
                     WHERE id IN (
                         SELECT i.id FROM incidents i
                         JOIN metric_instances mi ON mi.id = i.metric_instance_id
                         WHERE i.tenant_id = ?1 AND i.kind = 'breach' AND i.status = 'open'
                           AND (strftime('%s', 'now') - strftime('%s', i.created_at)) > (?2 * 3600)
                           AND (strftime('%s', 'now') - strftime('%s', mi.updated_at)) > ?3
                     )"
                ),
                params![tenant_id, max_age_hours, staleness_sec],
            )
            .await?;
        Ok(affected)
    }
}

fn is_unique_violation(error: &libsql::Error) -> bool {
    is_unique_violation_message(&error.to_string())
}

fn is_unique_violation_message(message: &str) -> bool {
    message.to_lowercase().contains("unique constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_is_independent_of_title_and_varies_by_kind() {
        let breach = dedup_key_for(IncidentKind::Breach, "mi-1");
        let no_data_metric = dedup_key_for(IncidentKind::NoDataMetric, "mi-1");
        let no_data_machine = dedup_key_for(IncidentKind::NoDataMachine, "mi-1");
        let http_failure = dedup_key_for(IncidentKind::HttpFailure, "mi-1");

        // same scope_id, different kind -> different dedup keys
        assert_ne!(breach, no_data_metric);
        assert_ne!(no_data_metric, no_data_machine);
        assert_ne!(no_data_machine, http_failure);
    }

    #[test]
    fn dedup_key_is_deterministic_for_same_kind_and_scope() {
        let a = dedup_key_for(IncidentKind::Breach, "mi-1");
        let b = dedup_key_for(IncidentKind::Breach, "mi-1");
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_key_varies_by_scope_id() {
        let a = dedup_key_for(IncidentKind::Breach, "mi-1");
        let b = dedup_key_for(IncidentKind::Breach, "mi-2");
        assert_ne!(a, b);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            IncidentKind::Breach,
            IncidentKind::NoDataMetric,
            IncidentKind::NoDataMachine,
            IncidentKind::HttpFailure,
        ] {
            assert_eq!(kind_from_str(kind_to_str(kind)).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_str_is_rejected() {
        assert!(kind_from_str("not_a_kind").is_err());
    }

    #[test]
    fn unique_violation_detection_is_case_insensitive() {
        assert!(is_unique_violation_message("UNIQUE constraint failed: incidents.dedup_key"));
        assert!(is_unique_violation_message("unique constraint failed"));
        assert!(!is_unique_violation_message("disk I/O error"));
    }
}
