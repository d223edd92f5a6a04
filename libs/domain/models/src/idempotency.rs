// libs/domain/models/src/idempotency.rs
//! Registro de deduplicación de peticiones de ingesta: una misma
//! `Idempotency-Key` enviada dos veces por el mismo tenant produce un
//! único efecto persistido.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub tenant_id: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}
