// [libs/infra/db/src/repositories/tenants.rs]
//! Tenants y su configuración de escaneo/notificación.

use crate::errors::DbError;
use crate::util::parse_ts;
use crate::TursoClient;
use libsql::{params, Row};
use monitor_domain::tenant::Tenant;
use monitor_domain::tenant_settings::TenantSettings;
use tracing::instrument;

fn row_to_tenant(row: &Row) -> Result<Tenant, DbError> {
    Ok(Tenant {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        api_key: row.get::<String>(2)?,
        created_at: parse_ts(row.get::<String>(3)?)?,
    })
}

#[derive(Clone)]
pub struct TenantRepository {
    database_client: TursoClient,
}

impl TenantRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    #[instrument(skip(self))]
    pub async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, api_key, created_at FROM tenants WHERE api_key = ?1",
                params![api_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_tenant(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, api_key, created_at FROM tenants WHERE id = ?1",
                params![tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_tenant(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Tenant>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query("SELECT id, name, api_key, created_at FROM tenants", ())
            .await?;

        let mut tenants = Vec::new();
        while let Some(row) = rows.next().await? {
            tenants.push(row_to_tenant(&row)?);
        }
        Ok(tenants)
    }

    #[instrument(skip(self, tenant))]
    pub async fn create(&self, tenant: &Tenant) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO tenants (id, name, api_key) VALUES (?1, ?2, ?3)",
                params![tenant.id.clone(), tenant.name.clone(), tenant.api_key.clone()],
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct TenantSettingsRepository {
    database_client: TursoClient,
    /// Segundo eslabón de la cadena tenant -> configuración global -> valor
    /// por defecto: usado como plantilla cuando el tenant no tiene fila
    /// propia en `tenant_settings`. `TenantSettings::default()` cubre el
    /// tercer eslabón (valor por defecto de siempre) para el resto de campos.
    global_defaults: TenantSettings,
}

impl TenantSettingsRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client, global_defaults: TenantSettings::default() }
    }

    pub fn with_global_defaults(client: TursoClient, global_defaults: TenantSettings) -> Self {
        Self { database_client: client, global_defaults }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, tenant_id: &str) -> Result<TenantSettings, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT tenant_id, metric_staleness_sec, startup_grace_sec, grace_period_sec, \
                 reminder_sec, grouping_enabled, grouping_window_sec, notify_on_resolve, \
                 chat_webhook_url, notification_email, max_stale_incident_age_hours \
                 FROM tenant_settings WHERE tenant_id = ?1",
                params![tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(TenantSettings {
                tenant_id: row.get::<String>(0)?,
                metric_staleness_sec: row.get::<i64>(1)?,
                startup_grace_sec: row.get::<i64>(2)?,
                grace_period_sec: row.get::<i64>(3)?,
                reminder_sec: row.get::<i64>(4)?,
                grouping_enabled: row.get::<i64>(5)? != 0,
                grouping_window_sec: row.get::<i64>(6)?,
                notify_on_resolve: row.get::<i64>(7)? != 0,
                chat_webhook_url: row.get::<Option<String>>(8)?,
                notification_email: row.get::<Option<String>>(9)?,
                max_stale_incident_age_hours: row.get::<i64>(10)?,
            }),
            None => Ok(TenantSettings {
                tenant_id: tenant_id.to_string(),
                ..self.global_defaults.clone()
            }),
        }
    }

    #[instrument(skip(self, settings))]
    pub async fn upsert(&self, settings: &TenantSettings) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "INSERT INTO tenant_settings (
                    tenant_id, metric_staleness_sec, startup_grace_sec, grace_period_sec,
                    reminder_sec, grouping_enabled, grouping_window_sec, notify_on_resolve,
                    chat_webhook_url, notification_email, max_stale_incident_age_hours
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                    metric_staleness_sec = excluded.metric_staleness_sec,
                    startup_grace_sec = excluded.startup_grace_sec,
                    grace_period_sec = excluded.grace_period_sec,
                    reminder_sec = excluded.reminder_sec,
                    grouping_enabled = excluded.grouping_enabled,
                    grouping_window_sec = excluded.grouping_window_sec,
                    notify_on_resolve = excluded.notify_on_resolve,
                    chat_webhook_url = excluded.chat_webhook_url,
                    notification_email = excluded.notification_email,
                    max_stale_incident_age_hours = excluded.max_stale_incident_age_hours",
                params![
                    settings.tenant_id.clone(),
                    settings.metric_staleness_sec,
                    settings.startup_grace_sec,
                    settings.grace_period_sec,
                    settings.reminder_sec,
                    settings.grouping_enabled as i64,
                    settings.grouping_window_sec,
                    settings.notify_on_resolve as i64,
                    settings.chat_webhook_url.clone(),
                    settings.notification_email.clone(),
                    settings.max_stale_incident_age_hours
                ],
            )
            .await?;
        Ok(())
    }
}
