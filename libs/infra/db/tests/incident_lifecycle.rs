// [libs/infra/db/tests/incident_lifecycle.rs]
//! Ejercita el repositorio de incidentes, el libro de notificaciones, el
//! outbox y la reserva de idempotencia contra un libSQL en memoria con
//! esquema real, sin mocks.

use monitor_db::repositories::incidents::{dedup_key_for, NewIncident};
use monitor_db::{
    IdempotencyRepository, IncidentRepository, NotificationLedgerRepository, OutboxRepository, TenantRepository,
    TursoClient,
};
use monitor_domain::incident::{IncidentKind, Severity};
use monitor_domain::notification_log::{NotificationProvider, NotificationStatus};
use monitor_domain::tenant::Tenant;

async fn seeded_client() -> TursoClient {
    let client = TursoClient::connect(":memory:", None).await.expect("in-memory connect");
    let tenants = TenantRepository::new(client.clone());
    tenants
        .create(&Tenant {
            id: "tenant1".into(),
            name: "Acme".into(),
            api_key: "key1".into(),
            created_at: chrono::Utc::now(),
        })
        .await
        .expect("seed tenant1");
    tenants
        .create(&Tenant {
            id: "tenant2".into(),
            name: "Globex".into(),
            api_key: "key2".into(),
            created_at: chrono::Utc::now(),
        })
        .await
        .expect("seed tenant2");
    client
}

#[tokio::test]
async fn opening_the_same_dedup_key_twice_only_creates_one_incident() {
    let client = seeded_client().await;
    let incidents = IncidentRepository::new(client);

    let first = incidents
        .open(NewIncident {
            tenant_id: "tenant1",
            kind: IncidentKind::Breach,
            scope_id: "metric-1",
            title: "threshold breach".into(),
            description: None,
            severity: Severity::Warning,
            machine_id: None,
            metric_instance_id: Some("metric-1"),
            http_target_id: None,
        })
        .await
        .expect("first open");
    assert!(first.created);

    let second = incidents
        .open(NewIncident {
            tenant_id: "tenant1",
            kind: IncidentKind::Breach,
            scope_id: "metric-1",
            title: "threshold breach (again)".into(),
            description: None,
            severity: Severity::Warning,
            machine_id: None,
            metric_instance_id: Some("metric-1"),
            http_target_id: None,
        })
        .await
        .expect("second open");

    assert!(!second.created);
    assert_eq!(first.incident.id, second.incident.id);

    let open = incidents.list_open("tenant1").await.expect("list open");
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn resolving_one_kind_never_closes_another_kind_on_the_same_scope() {
    let client = seeded_client().await;
    let incidents = IncidentRepository::new(client);

    let breach = incidents
        .open(NewIncident {
            tenant_id: "tenant1",
            kind: IncidentKind::Breach,
            scope_id: "metric-1",
            title: "threshold breach".into(),
            description: None,
            severity: Severity::Warning,
            machine_id: None,
            metric_instance_id: Some("metric-1"),
            http_target_id: None,
        })
        .await
        .expect("open breach");
    assert!(breach.created);

    let no_data = incidents
        .open(NewIncident {
            tenant_id: "tenant1",
            kind: IncidentKind::NoDataMetric,
            scope_id: "metric-1",
            title: "metric stopped reporting".into(),
            description: None,
            severity: Severity::Warning,
            machine_id: None,
            metric_instance_id: Some("metric-1"),
            http_target_id: None,
        })
        .await
        .expect("open no_data_metric");
    assert!(no_data.created);

    let no_data_dedup = dedup_key_for(IncidentKind::NoDataMetric, "metric-1");
    let resolved = incidents
        .resolve_open_by_dedup_key("tenant1", &no_data_dedup)
        .await
        .expect("resolve no_data_metric");
    assert!(resolved.is_some());

    let still_open = incidents.list_open("tenant1").await.expect("list open");
    assert_eq!(still_open.len(), 1);
    assert_eq!(still_open[0].kind, IncidentKind::Breach);
}

#[tokio::test]
async fn cooldown_lookup_skips_technical_providers_and_falls_back_to_the_real_send() {
    let client = seeded_client().await;
    let incidents = IncidentRepository::new(client.clone());
    let ledger = NotificationLedgerRepository::new(client);

    let opened = incidents
        .open(NewIncident {
            tenant_id: "tenant1",
            kind: IncidentKind::Breach,
            scope_id: "metric-1",
            title: "threshold breach".into(),
            description: None,
            severity: Severity::Warning,
            machine_id: None,
            metric_instance_id: Some("metric-1"),
            http_target_id: None,
        })
        .await
        .expect("open breach")
        .incident;

    ledger
        .record(
            "tenant1",
            Some(&opened.id),
            NotificationProvider::Grace,
            None,
            NotificationStatus::Success,
            Some("suppressed during startup grace".into()),
            None,
        )
        .await
        .expect("record grace marker");

    assert!(
        ledger.last_success_at(&opened.id).await.expect("lookup").is_none(),
        "a technical marker must never count as a real send for cooldown purposes"
    );

    ledger
        .record(
            "tenant1",
            Some(&opened.id),
            NotificationProvider::Chat,
            Some("#alerts"),
            NotificationStatus::Success,
            Some("threshold breach".into()),
            None,
        )
        .await
        .expect("record chat send");

    assert!(ledger.last_success_at(&opened.id).await.expect("lookup").is_some());
}

#[tokio::test]
async fn outbox_events_can_only_be_claimed_by_one_worker() {
    let client = seeded_client().await;
    let outbox = OutboxRepository::new(client);

    let event_id = outbox
        .save_event("tenant1", "notification_retry", &serde_json::json!({"tenant_id": "tenant1"}))
        .await
        .expect("save event");

    // due_events filters on next_attempt_at <= now; freshly inserted rows
    // default next_attempt_at to the insert time, so it is immediately due.
    let due = outbox.due_events(10).await.expect("due events");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, event_id);

    let first_claim = outbox.mark_delivering(&event_id).await.expect("first claim");
    assert!(first_claim, "the first worker must win the claim");

    let second_claim = outbox.mark_delivering(&event_id).await.expect("second claim");
    assert!(!second_claim, "a second worker must never claim an already-delivering event");

    outbox.mark_delivered(&event_id).await.expect("mark delivered");
    let due_after_delivery = outbox.due_events(10).await.expect("due events after delivery");
    assert!(due_after_delivery.is_empty());
}

#[tokio::test]
async fn an_idempotency_key_can_only_be_reserved_once() {
    let client = seeded_client().await;
    let idempotency = IdempotencyRepository::new(client);

    let first = idempotency.try_reserve("tenant1", "ingest-abc").await.expect("first reserve");
    assert!(first, "the first caller to see this key must process the request");

    let second = idempotency.try_reserve("tenant1", "ingest-abc").await.expect("second reserve");
    assert!(!second, "a repeated key for the same tenant must be recognized as a duplicate");

    let other_tenant = idempotency.try_reserve("tenant2", "ingest-abc").await.expect("other tenant reserve");
    assert!(other_tenant, "the same key under a different tenant is not a duplicate");
}
