// [libs/infra/db/src/repositories/metrics.rs]
//! Instancias de métrica, sus muestras, y los umbrales que las vigilan.

use crate::errors::DbError;
use crate::util::parse_ts;
use crate::TursoClient;
use libsql::{params, Row};
use monitor_domain::metric::{
    Condition, MetricInstance, MetricType, Sample, Threshold, ThresholdSeverity,
};
use tracing::instrument;

fn condition_to_str(condition: Condition) -> &'static str {
    match condition {
        Condition::Gt => "gt",
        Condition::Ge => "ge",
        Condition::Lt => "lt",
        Condition::Le => "le",
        Condition::Eq => "eq",
        Condition::Ne => "ne",
        Condition::Contains => "contains",
        Condition::NotContains => "not_contains",
        Condition::Regex => "regex",
    }
}

fn condition_from_str(raw: &str) -> Result<Condition, DbError> {
    Ok(match raw {
        "gt" => Condition::Gt,
        "ge" => Condition::Ge,
        "lt" => Condition::Lt,
        "le" => Condition::Le,
        "eq" => Condition::Eq,
        "ne" => Condition::Ne,
        "contains" => Condition::Contains,
        "not_contains" => Condition::NotContains,
        "regex" => Condition::Regex,
        other => return Err(DbError::MappingError(format!("unknown condition '{other}'"))),
    })
}

fn metric_type_to_str(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Numeric => "numeric",
        MetricType::Boolean => "boolean",
        MetricType::String => "string",
    }
}

fn metric_type_from_str(raw: &str) -> Result<MetricType, DbError> {
    Ok(match raw {
        "numeric" => MetricType::Numeric,
        "boolean" => MetricType::Boolean,
        "string" => MetricType::String,
        other => return Err(DbError::MappingError(format!("unknown metric_type '{other}'"))),
    })
}

fn severity_to_str(severity: ThresholdSeverity) -> &'static str {
    match severity {
        ThresholdSeverity::Info => "info",
        ThresholdSeverity::Warning => "warning",
        ThresholdSeverity::Critical => "critical",
    }
}

fn severity_from_str(raw: &str) -> Result<ThresholdSeverity, DbError> {
    Ok(match raw {
        "info" => ThresholdSeverity::Info,
        "warning" => ThresholdSeverity::Warning,
        "critical" => ThresholdSeverity::Critical,
        other => return Err(DbError::MappingError(format!("unknown threshold severity '{other}'"))),
    })
}

const METRIC_INSTANCE_COLUMNS: &str = "id, tenant_id, machine_id, metric_name, metric_type, \
     is_alerting_enabled, is_paused, created_at, updated_at";

fn row_to_metric_instance(row: &Row) -> Result<MetricInstance, DbError> {
    Ok(MetricInstance {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        machine_id: row.get::<String>(2)?,
        metric_name: row.get::<String>(3)?,
        metric_type: metric_type_from_str(&row.get::<String>(4)?)?,
        is_alerting_enabled: row.get::<i64>(5)? != 0,
        is_paused: row.get::<i64>(6)? != 0,
        created_at: parse_ts(row.get::<String>(7)?)?,
        updated_at: parse_ts(row.get::<String>(8)?)?,
    })
}

const THRESHOLD_COLUMNS: &str = "id, tenant_id, metric_instance_id, condition, value_num, \
     value_bool, value_str, severity, is_active, consecutive_breaches, min_duration_sec, \
     cooldown_sec, created_at";

fn row_to_threshold(row: &Row) -> Result<Threshold, DbError> {
    Ok(Threshold {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        metric_instance_id: row.get::<String>(2)?,
        condition: condition_from_str(&row.get::<String>(3)?)?,
        value_num: row.get::<Option<f64>>(4)?,
        value_bool: row.get::<Option<i64>>(5)?.map(|v| v != 0),
        value_str: row.get::<Option<String>>(6)?,
        severity: severity_from_str(&row.get::<String>(7)?)?,
        is_active: row.get::<i64>(8)? != 0,
        consecutive_breaches: row.get::<i64>(9)? as i32,
        min_duration_sec: row.get::<i64>(10)? as i32,
        cooldown_sec: row.get::<i64>(11)?,
        created_at: parse_ts(row.get::<String>(12)?)?,
    })
}

#[derive(Clone)]
pub struct MetricRepository {
    database_client: TursoClient,
}

impl MetricRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Crea la instancia de métrica si no existe y devuelve su id. Una
    /// métrica nueva nace alertable y sin pausar; el payload de ingesta
    /// puede pedir explícitamente lo contrario vía `alert_enabled`.
    #[instrument(skip(self))]
    pub async fn get_or_create_instance(
        &self,
        tenant_id: &str,
        machine_id: &str,
        metric_name: &str,
        metric_type: MetricType,
        alert_enabled: bool,
    ) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(
                "SELECT id FROM metric_instances WHERE machine_id = ?1 AND metric_name = ?2",
                params![machine_id, metric_name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            return Ok(row.get::<String>(0)?);
        }

        let id = uuid::Uuid::new_v4().to_string();
        connection
            .execute(
                "INSERT INTO metric_instances
                    (id, tenant_id, machine_id, metric_name, metric_type, is_alerting_enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(machine_id, metric_name) DO NOTHING",
                params![
                    id.clone(),
                    tenant_id,
                    machine_id,
                    metric_name,
                    metric_type_to_str(metric_type),
                    alert_enabled as i64
                ],
            )
            .await?;

        let mut rows = connection
            .query(
                "SELECT id FROM metric_instances WHERE machine_id = ?1 AND metric_name = ?2",
                params![machine_id, metric_name],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("metric instance vanished after insert".into()))?;
        Ok(row.get::<String>(0)?)
    }

    #[instrument(skip(self))]
    pub async fn touch_instance(&self, metric_instance_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE metric_instances SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![metric_instance_id],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, sample))]
    pub async fn insert_sample(&self, sample: &Sample) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO samples (id, metric_instance_id, value_numeric, value_bool, value_string, ts, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sample.id.clone(),
                    sample.metric_instance_id.clone(),
                    sample.value_numeric,
                    sample.value_bool.map(|b| b as i64),
                    sample.value_string.clone(),
                    sample.ts.to_rfc3339(),
                    sample.seq
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn latest_sample(&self, metric_instance_id: &str) -> Result<Option<Sample>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, metric_instance_id, value_numeric, value_bool, value_string, ts, seq
                 FROM samples WHERE metric_instance_id = ?1
                 ORDER BY ts DESC, seq DESC LIMIT 1",
                params![metric_instance_id],
            )
            .await?;

        let Some(row) = rows.next().await? else { return Ok(None) };
        Ok(Some(Sample {
            id: row.get::<String>(0)?,
            metric_instance_id: row.get::<String>(1)?,
            value_numeric: row.get::<Option<f64>>(2)?,
            value_bool: row.get::<Option<i64>>(3)?.map(|v| v != 0),
            value_string: row.get::<Option<String>>(4)?,
            ts: parse_ts(row.get::<String>(5)?)?,
            seq: row.get::<i64>(6)?,
        }))
    }

    #[instrument(skip(self))]
    pub async fn find_instance_by_id(
        &self,
        metric_instance_id: &str,
    ) -> Result<Option<MetricInstance>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {METRIC_INSTANCE_COLUMNS} FROM metric_instances WHERE id = ?1"),
                params![metric_instance_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_metric_instance(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_for_machine(&self, machine_id: &str) -> Result<Vec<MetricInstance>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {METRIC_INSTANCE_COLUMNS} FROM metric_instances WHERE machine_id = ?1"),
                params![machine_id],
            )
            .await?;

        let mut instances = Vec::new();
        while let Some(row) = rows.next().await? {
            instances.push(row_to_metric_instance(&row)?);
        }
        Ok(instances)
    }
}

#[derive(Clone)]
pub struct ThresholdRepository {
    database_client: TursoClient,
}

impl ThresholdRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self))]
    pub async fn list_active_for_metric(
        &self,
        metric_instance_id: &str,
    ) -> Result<Vec<Threshold>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {THRESHOLD_COLUMNS} FROM thresholds
                     WHERE metric_instance_id = ?1 AND is_active = 1"
                ),
                params![metric_instance_id],
            )
            .await?;

        let mut thresholds = Vec::new();
        while let Some(row) = rows.next().await? {
            thresholds.push(row_to_threshold(&row)?);
        }
        Ok(thresholds)
    }

    #[instrument(skip(self, threshold))]
    pub async fn create(&self, threshold: &Threshold) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO thresholds (
                    id, tenant_id, metric_instance_id, condition, value_num, value_bool,
                    value_str, severity, is_active, consecutive_breaches, min_duration_sec,
                    cooldown_sec
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    threshold.id.clone(),
                    threshold.tenant_id.clone(),
                    threshold.metric_instance_id.clone(),
                    condition_to_str(threshold.condition),
                    threshold.value_num,
                    threshold.value_bool.map(|b| b as i64),
                    threshold.value_str.clone(),
                    severity_to_str(threshold.severity),
                    threshold.is_active as i64,
                    threshold.consecutive_breaches as i64,
                    threshold.min_duration_sec as i64,
                    threshold.cooldown_sec
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_round_trips_through_str() {
        for condition in [
            Condition::Gt,
            Condition::Ge,
            Condition::Lt,
            Condition::Le,
            Condition::Eq,
            Condition::Ne,
            Condition::Contains,
            Condition::NotContains,
            Condition::Regex,
        ] {
            assert_eq!(condition_from_str(condition_to_str(condition)).unwrap(), condition);
        }
    }

    #[test]
    fn metric_type_round_trips_through_str() {
        for metric_type in [MetricType::Numeric, MetricType::Boolean, MetricType::String] {
            assert_eq!(metric_type_from_str(metric_type_to_str(metric_type)).unwrap(), metric_type);
        }
    }

    #[test]
    fn threshold_severity_round_trips_through_str() {
        for severity in [ThresholdSeverity::Info, ThresholdSeverity::Warning, ThresholdSeverity::Critical] {
            assert_eq!(severity_from_str(severity_to_str(severity)).unwrap(), severity);
        }
    }

    #[test]
    fn unknown_condition_str_is_rejected() {
        assert!(condition_from_str("bogus").is_err());
    }
}
