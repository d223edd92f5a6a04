// libs/domain/models/src/tenant.rs
//! Cliente (tenant) propietario de las máquinas y objetivos vigilados.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Un cliente del sistema de monitoreo, identificado por API key propia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Clave usada por el tenant para autenticar sus lecturas (`GET` endpoints).
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}
