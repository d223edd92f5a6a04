// libs/domain/models/src/outbox.rs
//! El outbox: cola durable de eventos de sincronización saliente
//! (archivado hacia un sistema externo), entregados con reintento
//! exponencial y jitter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Delivering,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub tenant_id: String,
    /// Nombre del tipo de evento (ej: "incident.opened", "incident.resolved").
    pub event_type: String,
    pub payload: Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
