// libs/domain/models/src/lib.rs
// =================================================================
// APARATO: MONITOR DOMAIN MODELS (V1.0)
// CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
// RESPONSABILIDAD: SINGLE SOURCE OF TRUTH DE ENTIDADES Y DTOs
//
// Entidades del motor de monitoreo: tenants, máquinas, métricas,
// umbrales, objetivos HTTP, incidentes y el libro de notificaciones.
// =================================================================

pub mod http_target;
pub mod idempotency;
pub mod incident;
pub mod machine;
pub mod metric;
pub mod notification_log;
pub mod outbox;
pub mod tenant;
pub mod tenant_settings;

pub mod prelude {
    pub use crate::http_target::*;
    pub use crate::idempotency::*;
    pub use crate::incident::*;
    pub use crate::machine::*;
    pub use crate::metric::*;
    pub use crate::notification_log::*;
    pub use crate::outbox::*;
    pub use crate::tenant::*;
    pub use crate::tenant_settings::*;
}
