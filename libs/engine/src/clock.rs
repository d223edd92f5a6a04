// [libs/engine/src/clock.rs]
//! Marca de arranque del proceso, usada por la gracia de inicio y por el
//! despejado de edad de métrica (`age = now - max(updated_at, process_start)`).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    started_at: DateTime<Utc>,
}

impl ProcessClock {
    pub fn start_now() -> Self {
        Self { started_at: Utc::now() }
    }

    /// Construye un reloj con una marca de arranque explícita, para que
    /// las pruebas puedan simular un proceso que lleva tiempo corriendo
    /// sin esperar el tiempo real de pared.
    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self { started_at }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// `true` mientras el proceso siga dentro de su ventana de gracia
    /// global; sólo suprime apertura de incidentes, nunca resolución.
    pub fn within_startup_grace(&self, now: DateTime<Utc>, grace_sec: i64) -> bool {
        (now - self.started_at) < chrono::Duration::seconds(grace_sec)
    }
}

impl Default for ProcessClock {
    fn default() -> Self {
        Self::start_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_grace_immediately_after_start() {
        let clock = ProcessClock::start_now();
        assert!(clock.within_startup_grace(Utc::now(), 120));
    }

    #[test]
    fn outside_grace_once_elapsed_past_window() {
        let clock = ProcessClock { started_at: Utc::now() - chrono::Duration::seconds(200) };
        assert!(!clock.within_startup_grace(Utc::now(), 120));
    }

    #[test]
    fn zero_grace_window_is_never_within_grace() {
        let clock = ProcessClock::start_now();
        assert!(!clock.within_startup_grace(Utc::now(), 0));
    }

    #[test]
    fn at_pins_an_explicit_started_at() {
        let started_at = Utc::now() - chrono::Duration::seconds(3600);
        let clock = ProcessClock::at(started_at);
        assert_eq!(clock.started_at(), started_at);
        assert!(!clock.within_startup_grace(Utc::now(), 120));
    }
}
