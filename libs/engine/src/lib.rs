// [libs/engine/src/lib.rs]
//! =================================================================
//! APARATO: MONITOR ENGINE (V1.0)
//! CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
//! RESPONSABILIDAD: SUPERFICIE PÚBLICA DE LOS SERVICIOS DEL MOTOR
//!
//! Cada componente del motor (evaluador de umbrales, escáner de
//! frescura, sondeo HTTP, despachador y relevo del outbox) vive como un
//! servicio independiente bajo `services`; `kernel.rs` en el binario
//! HTTP es quien los pone a correr como tareas de fondo.
//! =================================================================

pub mod clock;
pub mod config;
pub mod errors;
pub mod services;

pub use clock::ProcessClock;
pub use config::Settings;
pub use errors::EngineError;
pub use services::{
    freshness_scanner::FreshnessScanner, http_probe_runner::HttpProbeRunner,
    notification_dispatcher::NotificationDispatcher, outbox_relay::OutboxRelay,
    threshold_evaluator::ThresholdEvaluator, NotificationReceiver, NotificationRequest, NotificationSender,
};
