// [apps/monitor-api/src/lib.rs]
//! =================================================================
//! APARATO: MONITOR API LIBRARY ROOT (V1.0)
//! CLASIFICACIÓN: CRATE ROOT (ESTRATO L3)
//! RESPONSABILIDAD: ÁRBOL DE MÓDULOS DEL BINARIO HTTP
//! =================================================================

pub mod errors;
pub mod handlers;
pub mod kernel;
pub mod middleware;
pub mod routes;
pub mod state;

pub mod prelude {
    pub use crate::errors::ApiError;
    pub use crate::kernel::MonitorKernel;
    pub use crate::state::AppState;
}
