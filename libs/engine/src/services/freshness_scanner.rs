// [libs/engine/src/services/freshness_scanner.rs]
//! =================================================================
//! APARATO: FRESHNESS SCANNER (C4) (V1.0)
//! CLASIFICACIÓN: DOMAIN SERVICE (ESTRATO L2)
//! RESPONSABILIDAD: CLASIFICACIÓN UP/STALE/DOWN Y CICLO NO_DATA
//!
//! Tres fases por tenant: clasificar candidatas por máquina, decidir
//! según la matriz de §4.4, y barrer máquinas huérfanas (sin ninguna
//! métrica candidata). La gracia de arranque sólo suprime apertura:
//! toda resolución procede siempre.
//! =================================================================

use crate::clock::ProcessClock;
use crate::errors::EngineError;
use crate::services::{NotificationRequest, NotificationSender};
use chrono::Utc;
use monitor_db::repositories::incidents::{dedup_key_for, NewIncident};
use monitor_db::repositories::{
    IncidentRepository, MachineRepository, MetricRepository, TenantRepository, TenantSettingsRepository,
};
use monitor_domain::incident::{IncidentKind, Severity};
use monitor_domain::machine::{Machine, MachineStatus};
use monitor_domain::metric::MetricInstance;
use tracing::{info, instrument, warn};

pub struct FreshnessScanner {
    tenants: TenantRepository,
    tenant_settings: TenantSettingsRepository,
    machines: MachineRepository,
    metrics: MetricRepository,
    incidents: IncidentRepository,
    notifications: NotificationSender,
    clock: ProcessClock,
    global_startup_grace_sec: i64,
}

impl FreshnessScanner {
    pub fn new(
        tenants: TenantRepository,
        tenant_settings: TenantSettingsRepository,
        machines: MachineRepository,
        metrics: MetricRepository,
        incidents: IncidentRepository,
        notifications: NotificationSender,
        clock: ProcessClock,
        global_startup_grace_sec: i64,
    ) -> Self {
        Self {
            tenants,
            tenant_settings,
            machines,
            metrics,
            incidents,
            notifications,
            clock,
            global_startup_grace_sec,
        }
    }

    #[instrument(skip(self))]
    pub async fn scan_all_tenants(&self) -> Result<(), EngineError> {
        let tenants = self.tenants.list_all().await?;
        for tenant in tenants {
            if let Err(e) = self.scan_tenant(&tenant.id).await {
                warn!(tenant_id = %tenant.id, error = %e, "freshness scan failed for tenant, continuing");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn scan_tenant(&self, tenant_id: &str) -> Result<(), EngineError> {
        let settings = self.tenant_settings.get(tenant_id).await?;
        let now = Utc::now();

        let resolved = self
            .incidents
            .auto_resolve_stale_breaches(tenant_id, settings.max_stale_incident_age_hours, settings.metric_staleness_sec)
            .await?;
        if resolved > 0 {
            info!(tenant_id = %tenant_id, resolved, "auto-resolved stale breach incidents with no fresh underlying data");
        }
        let grace_sec = if settings.startup_grace_sec > 0 {
            settings.startup_grace_sec
        } else {
            self.global_startup_grace_sec
        };
        let suppress_open = self.clock.within_startup_grace(now, grace_sec);

        let machines = self.machines.list_for_tenant(tenant_id).await?;
        for machine in machines {
            let all_metrics = self.metrics.list_for_machine(&machine.id).await?;
            let candidates: Vec<MetricInstance> =
                all_metrics.into_iter().filter(|m| m.is_freshness_candidate()).collect();

            if candidates.is_empty() {
                self.sweep_orphan(tenant_id, &machine).await?;
                continue;
            }

            let staleness = chrono::Duration::seconds(settings.metric_staleness_sec);
            let mut stale = Vec::new();
            let mut fresh = Vec::new();
            for candidate in candidates {
                let last_sample = self.metrics.latest_sample(&candidate.id).await?;
                let last_seen = last_sample.map(|s| s.ts).unwrap_or(candidate.updated_at);
                let anchor = last_seen.max(self.clock.started_at());
                if now - anchor >= staleness {
                    stale.push(candidate);
                } else {
                    fresh.push(candidate);
                }
            }

            if fresh.is_empty() {
                self.handle_all_stale(tenant_id, &machine, suppress_open).await?;
            } else if stale.is_empty() {
                self.handle_all_fresh(tenant_id, &machine, settings.notify_on_resolve).await?;
            } else {
                self.handle_partial(tenant_id, &machine, &stale, &fresh, suppress_open, settings.notify_on_resolve)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_all_stale(&self, tenant_id: &str, machine: &Machine, suppress_open: bool) -> Result<(), EngineError> {
        self.incidents.resolve_all_metric_nodata_for_machine(tenant_id, &machine.id).await?;

        if suppress_open {
            return Ok(());
        }

        let outcome = self
            .incidents
            .open(NewIncident {
                tenant_id,
                kind: IncidentKind::NoDataMachine,
                scope_id: &machine.id,
                title: format!("machine {} is not reporting any metric", machine.name),
                description: None,
                severity: Severity::Critical,
                machine_id: Some(&machine.id),
                metric_instance_id: None,
                http_target_id: None,
            })
            .await?;

        self.machines.set_status(&machine.id, MachineStatus::Down).await?;

        if outcome.created {
            let request = NotificationRequest::new(
                tenant_id,
                Some(outcome.incident.id.clone()),
                Severity::Critical,
                outcome.incident.title.clone(),
                format!("machine {} has no fresh metrics", machine.name),
                false,
            );
            let _ = self.notifications.send(request).await;
        }
        Ok(())
    }

    async fn handle_all_fresh(&self, tenant_id: &str, machine: &Machine, notify_on_resolve: bool) -> Result<(), EngineError> {
        self.machines.set_status(&machine.id, MachineStatus::Up).await?;

        let dedup_key = dedup_key_for(IncidentKind::NoDataMachine, &machine.id);
        if let Some(resolved) = self.incidents.resolve_open_by_dedup_key(tenant_id, &dedup_key).await? {
            if notify_on_resolve {
                let request = NotificationRequest::new(
                    tenant_id,
                    Some(resolved.id.clone()),
                    Severity::Info,
                    format!("machine {} restored", machine.name),
                    format!("machine {} is reporting fresh metrics again", machine.name),
                    true,
                );
                let _ = self.notifications.send(request).await;
            }
        }
        Ok(())
    }

    async fn handle_partial(
        &self,
        tenant_id: &str,
        machine: &Machine,
        stale: &[MetricInstance],
        fresh: &[MetricInstance],
        suppress_open: bool,
        notify_on_resolve: bool,
    ) -> Result<(), EngineError> {
        self.machines.set_status(&machine.id, MachineStatus::Stale).await?;

        // Case B first: resolve any open NO_DATA_MACHINE and notify "partial
        // restore". A restore notification here suppresses the per-metric
        // restore notifications below for the same pass.
        let machine_dedup_key = dedup_key_for(IncidentKind::NoDataMachine, &machine.id);
        let mut suppress_metric_restore_notify = false;
        if let Some(resolved) = self.incidents.resolve_open_by_dedup_key(tenant_id, &machine_dedup_key).await? {
            suppress_metric_restore_notify = true;
            if notify_on_resolve {
                let request = NotificationRequest::new(
                    tenant_id,
                    Some(resolved.id.clone()),
                    Severity::Warning,
                    format!("machine {} partially restored", machine.name),
                    format!("machine {} has some metrics reporting again, others still stale", machine.name),
                    true,
                );
                let _ = self.notifications.send(request).await;
            }
        }

        // Case C: open NO_DATA_METRIC for each still-stale candidate.
        if !suppress_open {
            for metric in stale {
                let outcome = self
                    .incidents
                    .open(NewIncident {
                        tenant_id,
                        kind: IncidentKind::NoDataMetric,
                        scope_id: &metric.id,
                        title: format!("metric {} on {} stopped reporting", metric.metric_name, machine.name),
                        description: None,
                        severity: Severity::Warning,
                        machine_id: Some(&machine.id),
                        metric_instance_id: Some(&metric.id),
                        http_target_id: None,
                    })
                    .await?;

                if outcome.created {
                    let request = NotificationRequest::new(
                        tenant_id,
                        Some(outcome.incident.id.clone()),
                        Severity::Warning,
                        outcome.incident.title.clone(),
                        format!("metric {} on {} has no fresh samples", metric.metric_name, machine.name),
                        false,
                    );
                    let _ = self.notifications.send(request).await;
                }
            }
        }

        // Case D: resolve NO_DATA_METRIC for each metric that turned fresh
        // again, notifying unless a machine-restore notification already
        // covered this machine in the same pass.
        for metric in fresh {
            let dedup_key = dedup_key_for(IncidentKind::NoDataMetric, &metric.id);
            if let Some(resolved) = self.incidents.resolve_open_by_dedup_key(tenant_id, &dedup_key).await? {
                if notify_on_resolve && !suppress_metric_restore_notify {
                    let request = NotificationRequest::new(
                        tenant_id,
                        Some(resolved.id.clone()),
                        Severity::Info,
                        format!("metric {} on {} restored", metric.metric_name, machine.name),
                        format!("metric {} on {} has fresh samples again", metric.metric_name, machine.name),
                        true,
                    );
                    let _ = self.notifications.send(request).await;
                }
            }
        }

        Ok(())
    }

    /// Fase 3: una máquina sin ninguna métrica candidata ya no puede
    /// clasificarse; si tenía un NO_DATA_MACHINE abierto, ya no aplica.
    async fn sweep_orphan(&self, tenant_id: &str, machine: &Machine) -> Result<(), EngineError> {
        self.machines.set_status(&machine.id, MachineStatus::NoData).await?;
        let dedup_key = dedup_key_for(IncidentKind::NoDataMachine, &machine.id);
        if self.incidents.resolve_open_by_dedup_key(tenant_id, &dedup_key).await?.is_some() {
            info!(machine_id = %machine.id, "swept orphan NO_DATA_MACHINE for machine with no candidate metrics");
        }
        Ok(())
    }
}
