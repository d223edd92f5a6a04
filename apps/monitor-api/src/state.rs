// [apps/monitor-api/src/state.rs]
//! =================================================================
//! APARATO: APPLICATION STATE (V1.0)
//! CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
//! RESPONSABILIDAD: INYECCIÓN DE DEPENDENCIAS COMPARTIDAS POR AXUM
//!
//! Un único `Clone` barato (todo detrás de `Arc` o de tipos ya baratos
//! de clonar) que cruza cada handler y cada daemon de fondo. No hay
//! caché de configuración por tenant aquí: cada pasada de escaneo
//! construye su propio mapa local (ver monitor-engine).
//! =================================================================

use monitor_db::repositories::{
    HttpTargetRepository, IdempotencyRepository, IncidentRepository, MachineRepository, MetricRepository,
    NotificationLedgerRepository, OutboxRepository, TenantRepository, TenantSettingsRepository, ThresholdRepository,
};
use monitor_db::TursoClient;
use monitor_engine::services::{NotificationReceiver, NotificationSender};
use monitor_engine::{FreshnessScanner, HttpProbeRunner, NotificationDispatcher, OutboxRelay, ProcessClock, Settings, ThresholdEvaluator};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub database_client: TursoClient,
    pub settings: Arc<Settings>,
    pub clock: ProcessClock,

    pub tenants: TenantRepository,
    pub tenant_settings: TenantSettingsRepository,
    pub machines: MachineRepository,
    pub metrics: MetricRepository,
    pub thresholds: ThresholdRepository,
    pub http_targets: HttpTargetRepository,
    pub incidents: IncidentRepository,
    pub notification_ledger: NotificationLedgerRepository,
    pub outbox: OutboxRepository,
    pub idempotency: IdempotencyRepository,

    pub threshold_evaluator: Arc<ThresholdEvaluator>,

    /// Canal de entrada a la cola `notify`; cada detector encola aquí,
    /// el consumidor arrancado por el kernel la drena hacia el despachador.
    pub notification_sender: NotificationSender,
}

impl AppState {
    /// Construye el estado compartido y devuelve, junto a él, el extremo
    /// receptor de la cola de notificaciones — sólo el kernel debe
    /// quedarse con ese receptor, para arrancar su único consumidor.
    pub fn new(database_client: TursoClient, settings: Settings) -> (Self, NotificationReceiver) {
        let tenants = TenantRepository::new(database_client.clone());
        let tenant_settings =
            TenantSettingsRepository::with_global_defaults(database_client.clone(), settings.default_tenant_settings());
        let machines = MachineRepository::new(database_client.clone());
        let metrics = MetricRepository::new(database_client.clone());
        let thresholds = ThresholdRepository::new(database_client.clone());
        let http_targets = HttpTargetRepository::new(database_client.clone());
        let incidents = IncidentRepository::new(database_client.clone());
        let notification_ledger = NotificationLedgerRepository::new(database_client.clone());
        let outbox = OutboxRepository::new(database_client.clone());
        let idempotency = IdempotencyRepository::new(database_client.clone());

        let (notification_sender, notification_receiver) = tokio::sync::mpsc::channel(1024);

        let threshold_evaluator = Arc::new(ThresholdEvaluator::new(
            metrics.clone(),
            thresholds.clone(),
            incidents.clone(),
            notification_sender.clone(),
        ));

        let state = Self {
            database_client,
            settings: Arc::new(settings),
            clock: ProcessClock::start_now(),
            tenants,
            tenant_settings,
            machines,
            metrics,
            thresholds,
            http_targets,
            incidents,
            notification_ledger,
            outbox,
            idempotency,
            threshold_evaluator,
            notification_sender,
        };

        (state, notification_receiver)
    }

    pub fn freshness_scanner(&self) -> FreshnessScanner {
        FreshnessScanner::new(
            self.tenants.clone(),
            self.tenant_settings.clone(),
            self.machines.clone(),
            self.metrics.clone(),
            self.incidents.clone(),
            self.notification_sender.clone(),
            self.clock,
            self.settings.startup_grace_sec,
        )
    }

    pub fn http_probe_runner(&self) -> HttpProbeRunner {
        HttpProbeRunner::new(
            self.http_targets.clone(),
            self.incidents.clone(),
            self.tenant_settings.clone(),
            self.notification_ledger.clone(),
            self.notification_sender.clone(),
            self.clock,
            self.settings.startup_grace_sec,
        )
    }

    pub fn notification_dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(
            self.notification_ledger.clone(),
            self.tenant_settings.clone(),
            self.outbox.clone(),
            self.settings.notification_request_timeout,
        )
    }

    pub fn outbox_relay(&self) -> OutboxRelay {
        OutboxRelay::new(
            self.outbox.clone(),
            self.notification_sender.clone(),
            self.settings.outbox_backoffs.clone(),
            self.settings.outbox_jitter_pct,
            self.settings.outbox_max_attempts,
        )
    }
}
