// [libs/infra/db/src/schema.rs]
//! =================================================================
//! APARATO: DATABASE SCHEMA (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
//! RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA DE MIGRACIÓN
//!
//! La tabla `incidents` lleva un índice único parcial sobre
//! (tenant_id, dedup_key) restringido a status='open': es el único
//! mecanismo de exclusión mutua para abrir un incidente, sin locks en
//! proceso. `incident_sequences` sustituye la secuencia nativa por
//! tenant que libSQL no ofrece.
//! =================================================================

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, instrument};

const TACTICAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_TENANTS", r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            api_key TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_TENANT_SETTINGS", r#"
        CREATE TABLE IF NOT EXISTS tenant_settings (
            tenant_id TEXT PRIMARY KEY REFERENCES tenants(id),
            metric_staleness_sec INTEGER NOT NULL DEFAULT 300,
            startup_grace_sec INTEGER NOT NULL DEFAULT 120,
            grace_period_sec INTEGER NOT NULL DEFAULT 300,
            reminder_sec INTEGER NOT NULL DEFAULT 900,
            grouping_enabled INTEGER NOT NULL DEFAULT 0,
            grouping_window_sec INTEGER NOT NULL DEFAULT 300,
            notify_on_resolve INTEGER NOT NULL DEFAULT 1,
            chat_webhook_url TEXT,
            notification_email TEXT,
            max_stale_incident_age_hours INTEGER NOT NULL DEFAULT 24
        );
    "#),
    ("TABLE_MACHINES", r#"
        CREATE TABLE IF NOT EXISTS machines (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'up',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tenant_id, name)
        );
    "#),
    ("TABLE_METRIC_INSTANCES", r#"
        CREATE TABLE IF NOT EXISTS metric_instances (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            machine_id TEXT NOT NULL REFERENCES machines(id),
            metric_name TEXT NOT NULL,
            metric_type TEXT NOT NULL,
            is_alerting_enabled INTEGER NOT NULL DEFAULT 1,
            is_paused INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(machine_id, metric_name)
        );
    "#),
    ("TABLE_SAMPLES", r#"
        CREATE TABLE IF NOT EXISTS samples (
            id TEXT PRIMARY KEY,
            metric_instance_id TEXT NOT NULL REFERENCES metric_instances(id),
            value_numeric REAL,
            value_bool INTEGER,
            value_string TEXT,
            ts DATETIME NOT NULL,
            seq INTEGER NOT NULL
        );
    "#),
    ("TABLE_THRESHOLDS", r#"
        CREATE TABLE IF NOT EXISTS thresholds (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            metric_instance_id TEXT NOT NULL REFERENCES metric_instances(id),
            condition TEXT NOT NULL,
            value_num REAL,
            value_bool INTEGER,
            value_str TEXT,
            severity TEXT NOT NULL DEFAULT 'warning',
            is_active INTEGER NOT NULL DEFAULT 1,
            consecutive_breaches INTEGER NOT NULL DEFAULT 1,
            min_duration_sec INTEGER NOT NULL DEFAULT 0,
            cooldown_sec INTEGER NOT NULL DEFAULT 900,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_HTTP_TARGETS", r#"
        CREATE TABLE IF NOT EXISTS http_targets (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            url TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'GET',
            interval_sec INTEGER NOT NULL DEFAULT 60,
            timeout_sec INTEGER NOT NULL DEFAULT 10,
            accepted_status_ranges TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1,
            last_status INTEGER,
            last_latency_ms INTEGER,
            last_error TEXT,
            last_check_at DATETIME,
            last_state_change_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_INCIDENT_SEQUENCES", r#"
        CREATE TABLE IF NOT EXISTS incident_sequences (
            tenant_id TEXT PRIMARY KEY REFERENCES tenants(id),
            last_value INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_INCIDENTS", r#"
        CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            incident_number INTEGER NOT NULL,
            kind TEXT NOT NULL,
            dedup_key TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            severity TEXT NOT NULL DEFAULT 'warning',
            machine_id TEXT REFERENCES machines(id),
            metric_instance_id TEXT REFERENCES metric_instances(id),
            http_target_id TEXT REFERENCES http_targets(id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            resolved_at DATETIME
        );
    "#),
    ("TABLE_NOTIFICATION_LOG", r#"
        CREATE TABLE IF NOT EXISTS notification_log (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            incident_id TEXT REFERENCES incidents(id),
            provider TEXT NOT NULL,
            recipient TEXT,
            status TEXT NOT NULL,
            message TEXT,
            error TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            sent_at DATETIME,
            read INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_OUTBOX_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS outbox_events (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            next_attempt_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            delivered_at DATETIME,
            last_error TEXT
        );
    "#),
    ("TABLE_IDEMPOTENCY_KEYS", r#"
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            tenant_id TEXT NOT NULL REFERENCES tenants(id),
            idempotency_key TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY(tenant_id, idempotency_key)
        );
    "#),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    (
        "IDX_SAMPLES_METRIC_TS",
        "CREATE INDEX IF NOT EXISTS idx_samples_metric_ts ON samples(metric_instance_id, ts DESC, seq DESC);",
    ),
    (
        "IDX_THRESHOLDS_METRIC",
        "CREATE INDEX IF NOT EXISTS idx_thresholds_metric ON thresholds(metric_instance_id) WHERE is_active = 1;",
    ),
    (
        "IDX_INCIDENTS_OPEN_DEDUP",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_open_dedup ON incidents(tenant_id, dedup_key) WHERE status = 'open';",
    ),
    (
        "IDX_INCIDENTS_TENANT_STATUS",
        "CREATE INDEX IF NOT EXISTS idx_incidents_tenant_status ON incidents(tenant_id, status);",
    ),
    (
        "IDX_NOTIFICATION_TENANT",
        "CREATE INDEX IF NOT EXISTS idx_notification_tenant ON notification_log(tenant_id, created_at DESC);",
    ),
    (
        "IDX_NOTIFICATION_INCIDENT",
        "CREATE INDEX IF NOT EXISTS idx_notification_incident ON notification_log(incident_id, sent_at DESC);",
    ),
    (
        "IDX_OUTBOX_DUE",
        "CREATE INDEX IF NOT EXISTS idx_outbox_due ON outbox_events(status, next_attempt_at);",
    ),
    (
        "IDX_METRIC_INSTANCES_MACHINE",
        "CREATE INDEX IF NOT EXISTS idx_metric_instances_machine ON metric_instances(machine_id);",
    ),
];

/// Ejecuta la secuencia de sincronización del esquema: tablas y luego
/// índices. Idempotente: segura de invocar en cada arranque.
#[instrument(skip(database_connection))]
pub async fn apply_schema(database_connection: &Connection) -> Result<()> {
    solidify_base_strata(database_connection).await?;
    harden_access_layer(database_connection).await?;
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  solidifying: {}", identifier);
        db.execute(sql, ())
            .await
            .with_context(|| format!("table solidification failed: {identifier}"))?;
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  hardening: {}", identifier);
        db.execute(sql, ())
            .await
            .with_context(|| format!("index hardening failed: {identifier}"))?;
    }
    Ok(())
}
