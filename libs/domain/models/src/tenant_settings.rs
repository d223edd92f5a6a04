// libs/domain/models/src/tenant_settings.rs
//! Parámetros configurables por tenant que gobiernan el comportamiento
//! de los escáneres y del despachador de notificaciones. Cada getter en
//! los servicios de motor que lee un campo de aquí sigue la cadena de
//! respaldo tenant -> configuración global -> valor por defecto: estos
//! son los valores por defecto cuando el tenant no los fijó.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    /// Segundos tras los cuales una métrica sin nuevas muestras se
    /// considera obsoleta (`heartbeat_threshold_seconds` en la especificación).
    pub metric_staleness_sec: i64,
    /// Segundos de gracia tras el arranque del proceso durante los cuales
    /// el escáner de frescura no abre incidentes nuevos (sólo resuelve).
    /// Respaldado por la variable de entorno global si el tenant no lo fija.
    pub startup_grace_sec: i64,
    /// Ventana de gracia por tenant, medida desde `last_state_change_at`
    /// de un `HttpTarget`: un rechazo dentro de esta ventana no abre
    /// incidente, sólo registra un `skipped_grace`.
    pub grace_period_sec: i64,
    /// Cooldown mínimo entre dos notificaciones exitosas para el mismo
    /// incidente, en segundos (`reminder_seconds` en la especificación).
    pub reminder_sec: i64,
    /// Si está activo, varias notificaciones simultáneas del mismo tenant
    /// dentro de `grouping_window_sec` se colapsan en un único aviso.
    pub grouping_enabled: bool,
    pub grouping_window_sec: i64,
    /// Si es falso, una resolución nunca dispara un aviso "resuelto".
    pub notify_on_resolve: bool,
    /// Webhook de chat (Slack-compatible) al que se envían los avisos.
    pub chat_webhook_url: Option<String>,
    /// Dirección de email a la que se registran (sin enviar de verdad,
    /// ver DESIGN.md) los avisos.
    pub notification_email: Option<String>,
    /// Edad máxima, en horas, de un incidente de `Breach` abierto antes de
    /// ser auto-resuelto si su métrica ya quedó obsoleta.
    pub max_stale_incident_age_hours: i64,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            metric_staleness_sec: 300,
            startup_grace_sec: 120,
            grace_period_sec: 300,
            reminder_sec: 900,
            grouping_enabled: false,
            grouping_window_sec: 300,
            notify_on_resolve: true,
            chat_webhook_url: None,
            notification_email: None,
            max_stale_incident_age_hours: 24,
        }
    }
}
