// libs/domain/models/src/notification_log.rs
//! El libro de notificaciones: rastro de cada intento de aviso saliente,
//! usado tanto para mostrar al tenant como para decidir cooldowns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tope en bytes para `message`/`error` antes de persistir, para evitar
/// que una respuesta de proveedor desbordada infle el libro indefinidamente.
pub const NOTIFICATION_TEXT_MAX_BYTES: usize = 2000;

/// Proveedor real o técnico de un intento de notificación. `Grace` y
/// `Cooldown` son marcadores internos del despachador (§4.6): nunca
/// representan un envío externo y están excluidos de
/// `last_success_at()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationProvider {
    Chat,
    Email,
    Grace,
    Cooldown,
}

impl NotificationProvider {
    /// Proveedores técnicos nunca cuentan como un envío real a efectos de
    /// cooldown; ver `Notification Ledger.last_success_at`.
    pub fn is_technical(self) -> bool {
        matches!(self, NotificationProvider::Grace | NotificationProvider::Cooldown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Success,
    Failed,
    SkippedCooldown,
    SkippedGrace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: String,
    pub tenant_id: String,
    /// `None` para un aviso agrupado que no referencia un único incidente.
    pub incident_id: Option<String>,
    pub provider: NotificationProvider,
    pub recipient: Option<String>,
    pub status: NotificationStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Sólo se fija cuando `status == Success`.
    pub sent_at: Option<DateTime<Utc>>,
    /// `true` una vez el tenant marcó la notificación como leída vía API.
    pub read: bool,
}

/// Trunca un texto de bitácora a `NOTIFICATION_TEXT_MAX_BYTES`, respetando
/// fronteras de carácter UTF-8.
pub fn truncate_log_text(text: &str) -> String {
    if text.len() <= NOTIFICATION_TEXT_MAX_BYTES {
        return text.to_string();
    }
    let mut end = NOTIFICATION_TEXT_MAX_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technical_providers_excluded_from_cooldown() {
        assert!(NotificationProvider::Grace.is_technical());
        assert!(NotificationProvider::Cooldown.is_technical());
        assert!(!NotificationProvider::Chat.is_technical());
        assert!(!NotificationProvider::Email.is_technical());
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_log_text("short message"), "short message");
    }

    #[test]
    fn long_text_is_truncated_to_the_byte_cap() {
        let long = "x".repeat(NOTIFICATION_TEXT_MAX_BYTES + 500);
        let truncated = truncate_log_text(&long);
        assert_eq!(truncated.len(), NOTIFICATION_TEXT_MAX_BYTES);
    }

    #[test]
    fn truncation_respects_utf8_char_boundaries() {
        // multi-byte char straddling the cut point must not panic or split a codepoint
        let mut long = "é".repeat(NOTIFICATION_TEXT_MAX_BYTES);
        long.push_str("tail");
        let truncated = truncate_log_text(&long);
        assert!(truncated.len() <= NOTIFICATION_TEXT_MAX_BYTES);
        assert!(truncated.is_char_boundary(truncated.len()));
    }
}
