// libs/domain/models/src/machine.rs
//! Una máquina física o virtual perteneciente a un tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estado compuesto de una máquina, derivado por el escáner de frescura a
/// partir de la observación más reciente entre todas sus métricas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Up,
    Stale,
    Down,
    NoData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: MachineStatus,
    pub created_at: DateTime<Utc>,
    /// Última vez que se recibió cualquier muestra de esta máquina.
    pub updated_at: DateTime<Utc>,
}
