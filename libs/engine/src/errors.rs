// [libs/engine/src/errors.rs]
//! =================================================================
//! APARATO: ENGINE ERROR CATALOG (V1.0)
//! CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
//! RESPONSABILIDAD: TAXONOMÍA DE FALLOS DE LOS SERVICIOS DE DOMINIO
//!
//! `Transient` marca condiciones candidatas a reintento (una entrega de
//! notificación, un sondeo HTTP que falló por timeout); `Fatal` no lo es.
//! =================================================================

use monitor_db::errors::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("not authorized")]
    NotAuthorized,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("duplicate request")]
    Duplicate,

    #[error("conflicting state: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal failure: {0}")]
    Fatal(String),

    #[error(transparent)]
    Database(#[from] DbError),
}
