// [libs/infra/db/src/lib.rs]
//! =================================================================
//! APARATO: DATABASE ADAPTER (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
//! RESPONSABILIDAD: EXPOSICIÓN DEL CLIENTE Y LOS REPOSITORIOS
//! =================================================================

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;
pub mod util;

pub use client::TursoClient;
pub use errors::DbError;
pub use repositories::*;
