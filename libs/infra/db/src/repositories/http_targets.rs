// [libs/infra/db/src/repositories/http_targets.rs]
//! Endpoints HTTP sondeados periódicamente.

use crate::errors::DbError;
use crate::util::parse_ts_opt;
use crate::TursoClient;
use libsql::{params, Row};
use monitor_domain::http_target::{HttpMethod, HttpTarget};
use tracing::instrument;

fn method_to_str(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
        HttpMethod::Head => "HEAD",
    }
}

fn method_from_str(raw: &str) -> Result<HttpMethod, DbError> {
    Ok(match raw {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "HEAD" => HttpMethod::Head,
        other => return Err(DbError::MappingError(format!("unknown http method '{other}'"))),
    })
}

const SELECT_COLUMNS: &str = "id, tenant_id, url, method, interval_sec, timeout_sec, \
     accepted_status_ranges, is_active, last_status, last_latency_ms, last_error, \
     last_check_at, last_state_change_at, created_at";

fn row_to_http_target(row: &Row) -> Result<HttpTarget, DbError> {
    let ranges_json = row.get::<String>(6)?;
    let accepted_status_ranges: Vec<(u16, u16)> = serde_json::from_str(&ranges_json)
        .map_err(|e| DbError::MappingError(format!("bad accepted_status_ranges: {e}")))?;

    Ok(HttpTarget {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        url: row.get::<String>(2)?,
        method: method_from_str(&row.get::<String>(3)?)?,
        interval_sec: row.get::<i64>(4)? as i32,
        timeout_sec: row.get::<i64>(5)? as i32,
        accepted_status_ranges,
        is_active: row.get::<i64>(7)? != 0,
        last_status: row.get::<Option<i64>>(8)?.map(|v| v as i32),
        last_latency_ms: row.get::<Option<i64>>(9)?,
        last_error: row.get::<Option<String>>(10)?,
        last_check_at: parse_ts_opt(row.get::<Option<String>>(11)?)?,
        last_state_change_at: parse_ts_opt(row.get::<Option<String>>(12)?)?,
        created_at: parse_ts_opt(Some(row.get::<String>(13)?))?
            .ok_or_else(|| DbError::MappingError("created_at cannot be null".into()))?,
    })
}

#[derive(Clone)]
pub struct HttpTargetRepository {
    database_client: TursoClient,
}

impl HttpTargetRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self))]
    pub async fn list_active(&self) -> Result<Vec<HttpTarget>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM http_targets WHERE is_active = 1"),
                (),
            )
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(row_to_http_target(&row)?);
        }
        Ok(targets)
    }

    #[instrument(skip(self, target))]
    pub async fn create(&self, target: &HttpTarget) -> Result<(), DbError> {
        let ranges_json = serde_json::to_string(&target.accepted_status_ranges)
            .map_err(|e| DbError::MappingError(format!("cannot serialize ranges: {e}")))?;

        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO http_targets (
                    id, tenant_id, url, method, interval_sec, timeout_sec,
                    accepted_status_ranges, is_active
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    target.id.clone(),
                    target.tenant_id.clone(),
                    target.url.clone(),
                    method_to_str(target.method),
                    target.interval_sec as i64,
                    target.timeout_sec as i64,
                    ranges_json,
                    target.is_active as i64
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, http_target_id: &str) -> Result<Option<HttpTarget>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM http_targets WHERE id = ?1"),
                params![http_target_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_http_target(&row)?)),
            None => Ok(None),
        }
    }

    /// Registra el resultado de un sondeo. `state_changed` indica si el
    /// veredicto aceptar/rechazar difiere del sondeo anterior: sólo en ese
    /// caso se mueve `last_state_change_at`, que ancla la ventana de
    /// gracia por tenant.
    #[instrument(skip(self))]
    pub async fn record_probe_result(
        &self,
        http_target_id: &str,
        status: i32,
        latency_ms: i64,
        error: Option<&str>,
        state_changed: bool,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        if state_changed {
            connection
                .execute(
                    "UPDATE http_targets SET
                        last_status = ?2, last_latency_ms = ?3, last_error = ?4,
                        last_check_at = CURRENT_TIMESTAMP, last_state_change_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    params![http_target_id, status, latency_ms, error],
                )
                .await?;
        } else {
            connection
                .execute(
                    "UPDATE http_targets SET
                        last_status = ?2, last_latency_ms = ?3, last_error = ?4,
                        last_check_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    params![http_target_id, status, latency_ms, error],
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_str() {
        for method in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Head] {
            assert_eq!(method_from_str(method_to_str(method)).unwrap(), method);
        }
    }

    #[test]
    fn unknown_method_str_is_rejected() {
        assert!(method_from_str("PATCH").is_err());
    }
}
