// [libs/infra/db/src/errors.rs]
//! =================================================================
//! APARATO: DATABASE ERROR CATALOG (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
//! RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
//! =================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("[DB_NET_FAULT]: connection severed -> {0}")]
    ConnectionError(String),

    #[error("[DB_CONFIG_FAULT]: configuration invalid -> {0}")]
    ConfigurationError(String),

    #[error("[DB_QUERY_FAULT]: query rejected -> {0}")]
    QueryError(#[from] libsql::Error),

    #[error("[DB_MAPPING_FAULT]: row mapping failed -> {0}")]
    MappingError(String),

    #[error("[INCIDENT_FAULT]: incident not found")]
    IncidentNotFound,

    #[error("[TENANT_FAULT]: tenant not found")]
    TenantNotFound,

    #[error("[OUTBOX_FAULT]: event not found")]
    OutboxEventNotFound,

    #[error("[DB_FAULT]: transaction collapse -> {0}")]
    TransactionError(String),
}
