// [libs/infra/db/src/repositories/mod.rs]
//! =================================================================
//! APARATO: REPOSITORY ACCESS MATRIX (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
//! RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
//! =================================================================

pub mod http_targets;
pub mod idempotency;
pub mod incidents;
pub mod machines;
pub mod metrics;
pub mod notification_ledger;
pub mod outbox;
pub mod tenants;

pub use http_targets::HttpTargetRepository;
pub use idempotency::IdempotencyRepository;
pub use incidents::IncidentRepository;
pub use machines::MachineRepository;
pub use metrics::{MetricRepository, ThresholdRepository};
pub use notification_ledger::NotificationLedgerRepository;
pub use outbox::OutboxRepository;
pub use tenants::{TenantRepository, TenantSettingsRepository};
