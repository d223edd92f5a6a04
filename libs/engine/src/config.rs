// [libs/engine/src/config.rs]
//! =================================================================
//! APARATO: ENGINE SETTINGS (V1.0)
//! CLASIFICACIÓN: CONFIGURATION LAYER (ESTRATO L1)
//! RESPONSABILIDAD: CARGA DE VARIABLES DE ENTORNO CON VALORES POR DEFECTO
//! =================================================================

use monitor_domain::tenant_settings::TenantSettings;
use std::env;
use std::time::Duration;

/// Intervalos y tolerancias que gobiernan los daemons del motor. Todos
/// tienen un valor por defecto razonable; el entorno sólo los ajusta.
#[derive(Debug, Clone)]
pub struct Settings {
    pub freshness_scan_interval: Duration,
    pub http_probe_default_interval: Duration,
    pub outbox_relay_interval: Duration,
    pub outbox_max_attempts: u32,
    pub outbox_jitter_pct: f64,
    pub notification_request_timeout: Duration,
    /// Segundos de gracia tras el arranque del proceso, respaldo global
    /// cuando el tenant no fija su propio `startup_grace_sec`.
    pub startup_grace_sec: i64,
    /// Tolerancia máxima hacia el futuro para `sent_at` en la ingesta,
    /// pasado la cual se rechaza con 422.
    pub ingest_future_max_sec: i64,
    /// Antigüedad máxima de `sent_at` antes de archivar sin procesar.
    pub ingest_late_max_sec: i64,
    /// Tabla de reintento del relevo del outbox, en segundos, indexada
    /// por `attempts - 1` (se clampa a la última entrada).
    pub outbox_backoffs: Vec<u64>,
    /// Segundo eslabón de la cadena de respaldo tenant -> configuración
    /// global -> valor por defecto: usado por `TenantSettingsRepository`
    /// cuando un tenant no tiene fila propia en `tenant_settings`.
    pub global_reminder_sec: i64,
    pub global_metric_staleness_sec: i64,
    pub global_grace_period_sec: i64,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn default_outbox_backoffs() -> Vec<u64> {
    env::var("OUTBOX_BACKOFFS")
        .ok()
        .map(|raw| parse_outbox_backoffs(&raw))
        .filter(|v: &Vec<u64>| !v.is_empty())
        .unwrap_or_else(|| vec![30, 60, 120, 300, 600])
}

fn parse_outbox_backoffs(raw: &str) -> Vec<u64> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            freshness_scan_interval: Duration::from_secs(env_u64("FRESHNESS_SCAN_INTERVAL_SEC", 45)),
            http_probe_default_interval: Duration::from_secs(env_u64("HTTP_PROBE_DEFAULT_INTERVAL_SEC", 60)),
            outbox_relay_interval: Duration::from_secs(env_u64("OUTBOX_RELAY_INTERVAL_SEC", 5)),
            outbox_max_attempts: env_u64("OUTBOX_MAX_ATTEMPTS", 5) as u32,
            outbox_jitter_pct: env_f64("OUTBOX_JITTER_PCT", 0.2).clamp(0.0, 0.9),
            notification_request_timeout: Duration::from_secs(env_u64("NOTIFICATION_TIMEOUT_SEC", 10)),
            startup_grace_sec: env_i64("MONITORING_STARTUP_GRACE_SECONDS", 120),
            ingest_future_max_sec: env_i64("INGEST_FUTURE_MAX_SECONDS", 60),
            ingest_late_max_sec: env_i64("INGEST_LATE_MAX_SECONDS", 86400),
            outbox_backoffs: default_outbox_backoffs(),
            global_reminder_sec: env_i64("ALERT_REMINDER_MINUTES", 15) * 60,
            global_metric_staleness_sec: env_i64("METRIC_STALENESS_SECONDS", 300),
            global_grace_period_sec: env_i64("GRACE_PERIOD_SECONDS", 300),
        }
    }

    /// Tercer y segundo eslabón de la cadena de respaldo: los valores que
    /// usa `TenantSettingsRepository::get` cuando el tenant no tiene fila
    /// propia. Siguen viniendo del entorno, no de un caché de proceso, tal
    /// como exige que la configuración de tenant se relea en cada pasada.
    pub fn default_tenant_settings(&self) -> TenantSettings {
        TenantSettings {
            metric_staleness_sec: self.global_metric_staleness_sec,
            startup_grace_sec: self.startup_grace_sec,
            grace_period_sec: self.global_grace_period_sec,
            reminder_sec: self.global_reminder_sec,
            ..TenantSettings::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_backoff_list() {
        assert_eq!(parse_outbox_backoffs("30,60,120,300,600"), vec![30, 60, 120, 300, 600]);
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(parse_outbox_backoffs(" 30, 60 ,120"), vec![30, 60, 120]);
    }

    #[test]
    fn drops_unparsable_entries_rather_than_failing_outright() {
        assert_eq!(parse_outbox_backoffs("30,oops,120"), vec![30, 120]);
    }

    #[test]
    fn empty_input_yields_empty_vec_so_caller_falls_back_to_defaults() {
        assert!(parse_outbox_backoffs("").is_empty());
    }

    #[test]
    fn default_tenant_settings_reflects_the_global_env_layer() {
        let mut settings = Settings::from_env();
        settings.global_reminder_sec = 1800;
        settings.global_metric_staleness_sec = 600;
        settings.global_grace_period_sec = 120;
        settings.startup_grace_sec = 90;

        let defaults = settings.default_tenant_settings();
        assert_eq!(defaults.reminder_sec, 1800);
        assert_eq!(defaults.metric_staleness_sec, 600);
        assert_eq!(defaults.grace_period_sec, 120);
        assert_eq!(defaults.startup_grace_sec, 90);
        // fields with no dedicated global toggle keep the hard default
        assert_eq!(defaults.grouping_window_sec, TenantSettings::default().grouping_window_sec);
    }
}
