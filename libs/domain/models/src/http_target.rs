// libs/domain/models/src/http_target.rs
//! Endpoints HTTP vigilados por sondeo periódico.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Head,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTarget {
    pub id: String,
    pub tenant_id: String,
    pub url: String,
    pub method: HttpMethod,
    /// Intervalo entre sondeos, en segundos.
    pub interval_sec: i32,
    pub timeout_sec: i32,
    /// Códigos de estado HTTP explícitamente aceptados. Si está vacío, se
    /// acepta cualquier respuesta con `status < 500 && status != 0`.
    pub accepted_status_ranges: Vec<(u16, u16)>,
    pub is_active: bool,
    /// Último código de estado observado. `0` representa un fallo de
    /// transporte (timeout, DNS, conexión rechazada), nunca `null`.
    pub last_status: Option<i32>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub last_check_at: Option<DateTime<Utc>>,
    /// Se actualiza sólo cuando el veredicto aceptar/rechazar cambia
    /// respecto al sondeo anterior; ancla la ventana de gracia por tenant.
    pub last_state_change_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HttpTarget {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_check_at {
            None => true,
            Some(last) => now - last >= chrono::Duration::seconds(self.interval_sec as i64),
        }
    }

    /// Aplica la política de aceptación de §4.5: rangos explícitos si
    /// están configurados, de lo contrario `status < 500 && status != 0`.
    pub fn accepts(&self, status: i32) -> bool {
        if self.accepted_status_ranges.is_empty() {
            return status != 0 && status < 500;
        }
        self.accepted_status_ranges
            .iter()
            .any(|(lo, hi)| status >= *lo as i32 && status <= *hi as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(accepted_status_ranges: Vec<(u16, u16)>) -> HttpTarget {
        HttpTarget {
            id: "t1".into(),
            tenant_id: "tenant1".into(),
            url: "https://example.com/health".into(),
            method: HttpMethod::Get,
            interval_sec: 60,
            timeout_sec: 5,
            accepted_status_ranges,
            is_active: true,
            last_status: None,
            last_latency_ms: None,
            last_error: None,
            last_check_at: None,
            last_state_change_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn default_policy_accepts_anything_under_500_except_zero() {
        let t = target(vec![]);
        assert!(t.accepts(200));
        assert!(t.accepts(404));
        assert!(t.accepts(499));
        assert!(!t.accepts(500));
        assert!(!t.accepts(503));
        assert!(!t.accepts(0));
    }

    #[test]
    fn explicit_ranges_override_default_policy() {
        let t = target(vec![(200, 299), (304, 304)]);
        assert!(t.accepts(200));
        assert!(t.accepts(250));
        assert!(t.accepts(304));
        assert!(!t.accepts(404));
        // explicit ranges take over even if the default policy would pass it
        assert!(!t.accepts(300));
    }

    #[test]
    fn is_due_when_never_checked() {
        let t = target(vec![]);
        assert!(t.is_due(Utc::now()));
    }

    #[test]
    fn is_due_respects_interval() {
        let mut t = target(vec![]);
        let now = Utc::now();
        t.last_check_at = Some(now - chrono::Duration::seconds(30));
        assert!(!t.is_due(now));
        t.last_check_at = Some(now - chrono::Duration::seconds(61));
        assert!(t.is_due(now));
    }
}
