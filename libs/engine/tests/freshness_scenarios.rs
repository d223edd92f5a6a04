// [libs/engine/tests/freshness_scenarios.rs]
//! Ejercita el escáner de frescura de punta a punta contra un libSQL en
//! memoria: cubre S3 (un DOWN de máquina suplanta los NO_DATA_METRIC
//! abiertos) y S4 (la restauración parcial reabre/resuelve los incidentes
//! correctos y emite el aviso "parcialmente restaurada").
//!
//! La ventana de obsolescencia se fija deliberadamente corta
//! (`STALENESS_SEC`) para que S3 pueda observar una métrica fresca
//! volverse obsoleta con una espera real breve, en vez de fabricar
//! marcas de tiempo retroactivas que `latest_sample` (ordenado por
//! `ts DESC`) nunca elegiría como la más reciente.

use chrono::Utc;
use monitor_db::repositories::{
    IncidentRepository, MachineRepository, MetricRepository, TenantRepository, TenantSettingsRepository,
};
use monitor_db::TursoClient;
use monitor_domain::incident::{IncidentKind, Severity};
use monitor_domain::machine::MachineStatus;
use monitor_domain::metric::{MetricType, Sample};
use monitor_domain::tenant::Tenant;
use monitor_domain::tenant_settings::TenantSettings;
use monitor_engine::{FreshnessScanner, ProcessClock};
use std::time::Duration;

const STALENESS_SEC: i64 = 2;

async fn seeded_client() -> TursoClient {
    let client = TursoClient::connect(":memory:", None).await.expect("in-memory connect");
    let tenants = TenantRepository::new(client.clone());
    tenants
        .create(&Tenant { id: "tenant1".into(), name: "Acme".into(), api_key: "key1".into(), created_at: Utc::now() })
        .await
        .expect("seed tenant1");

    let tenant_settings = TenantSettingsRepository::new(client.clone());
    tenant_settings
        .upsert(&TenantSettings {
            tenant_id: "tenant1".into(),
            metric_staleness_sec: STALENESS_SEC,
            notify_on_resolve: true,
            ..Default::default()
        })
        .await
        .expect("seed tenant settings");

    client
}

async fn seed_sample(metrics: &MetricRepository, metric_instance_id: &str, age_sec: i64) {
    metrics
        .insert_sample(&Sample {
            id: uuid::Uuid::new_v4().to_string(),
            metric_instance_id: metric_instance_id.to_string(),
            value_numeric: Some(1.0),
            value_bool: None,
            value_string: None,
            ts: Utc::now() - chrono::Duration::seconds(age_sec),
            seq: 0,
        })
        .await
        .expect("seed sample");
}

struct Fixture {
    machines: MachineRepository,
    incidents: IncidentRepository,
    scanner: FreshnessScanner,
    metrics: MetricRepository,
    machine_id: String,
    metric_a: String,
    metric_b: String,
    metric_c: String,
}

async fn build_fixture() -> (Fixture, tokio::sync::mpsc::Receiver<monitor_engine::NotificationRequest>) {
    let client = seeded_client().await;
    let machines = MachineRepository::new(client.clone());
    let metrics = MetricRepository::new(client.clone());
    let incidents = IncidentRepository::new(client.clone());
    let tenants = TenantRepository::new(client.clone());
    let tenant_settings = TenantSettingsRepository::new(client.clone());

    let machine_id = machines.get_or_create("tenant1", "web-01").await.expect("create machine");
    let metric_a = metrics
        .get_or_create_instance("tenant1", &machine_id, "metric.a", MetricType::Numeric, true)
        .await
        .expect("create metric a");
    let metric_b = metrics
        .get_or_create_instance("tenant1", &machine_id, "metric.b", MetricType::Numeric, true)
        .await
        .expect("create metric b");
    let metric_c = metrics
        .get_or_create_instance("tenant1", &machine_id, "metric.c", MetricType::Numeric, true)
        .await
        .expect("create metric c");

    let (sender, receiver) = tokio::sync::mpsc::channel(64);

    // Process start is pinned far in the past so the freshness clamp
    // (`age = now - max(updated_at, process_start)`) never masks a
    // genuinely stale sample, and so startup grace never suppresses an
    // open in these scenarios.
    let clock = ProcessClock::at(Utc::now() - chrono::Duration::seconds(3600));

    let scanner = FreshnessScanner::new(
        tenants,
        tenant_settings,
        machines.clone(),
        metrics.clone(),
        incidents.clone(),
        sender,
        clock,
        0,
    );

    (Fixture { machines, incidents, scanner, metrics, machine_id, metric_a, metric_b, metric_c }, receiver)
}

#[tokio::test]
async fn s3_machine_down_supersedes_metric_level_no_data() {
    let (fixture, mut notifications) = build_fixture().await;

    // Round 1: A is already stale, B and C are freshly reporting.
    seed_sample(&fixture.metrics, &fixture.metric_a, STALENESS_SEC * 10).await;
    seed_sample(&fixture.metrics, &fixture.metric_b, 0).await;
    seed_sample(&fixture.metrics, &fixture.metric_c, 0).await;

    fixture.scanner.scan_all_tenants().await.expect("first scan");

    let a_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMetric, &fixture.metric_a);
    let open_a = fixture
        .incidents
        .find_open_by_dedup_key("tenant1", &a_dedup)
        .await
        .expect("query")
        .expect("NO_DATA_METRIC(A) should be open after round 1");
    assert_eq!(open_a.kind, IncidentKind::NoDataMetric);

    let machine_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMachine, &fixture.machine_id);
    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &machine_dedup).await.unwrap().is_none(),
        "no machine-level incident yet, only one metric is stale"
    );

    // B and C's last sample ages past the (short) staleness window
    // without any new sample arriving — they go stale too.
    tokio::time::sleep(Duration::from_millis((STALENESS_SEC as u64) * 1500)).await;

    fixture.scanner.scan_all_tenants().await.expect("second scan");

    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &a_dedup).await.unwrap().is_none(),
        "NO_DATA_METRIC(A) must be resolved once the machine-level incident supersedes it"
    );
    let machine_incident = fixture
        .incidents
        .find_open_by_dedup_key("tenant1", &machine_dedup)
        .await
        .expect("query")
        .expect("NO_DATA_MACHINE should now be open");
    assert_eq!(machine_incident.severity, Severity::Critical);

    let machine = fixture.machines.find_by_id(&fixture.machine_id).await.unwrap().unwrap();
    assert_eq!(machine.status, MachineStatus::Down);

    // Exactly one critical notification for the machine; no notifications
    // for B/C's individual supersession (they never got their own
    // NO_DATA_METRIC opened before the machine-level incident took over).
    let mut seen = Vec::new();
    while let Ok(request) = notifications.try_recv() {
        seen.push(request);
    }
    let machine_level: Vec<_> =
        seen.iter().filter(|r| r.incident_id.as_deref() == Some(machine_incident.id.as_str())).collect();
    assert_eq!(machine_level.len(), 1, "exactly one notification for the machine-level incident");
    assert!(machine_level[0].severity == Severity::Critical);
}

#[tokio::test]
async fn s4_partial_restore_reopens_metric_incidents_and_resolves_machine() {
    let (fixture, mut notifications) = build_fixture().await;

    // Drive straight to all-stale so NO_DATA_MACHINE opens.
    let deep_stale = STALENESS_SEC * 10;
    seed_sample(&fixture.metrics, &fixture.metric_a, deep_stale).await;
    seed_sample(&fixture.metrics, &fixture.metric_b, deep_stale).await;
    seed_sample(&fixture.metrics, &fixture.metric_c, deep_stale).await;
    fixture.scanner.scan_all_tenants().await.expect("drive to all-stale");

    let machine_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMachine, &fixture.machine_id);
    assert!(fixture.incidents.find_open_by_dedup_key("tenant1", &machine_dedup).await.unwrap().is_some());

    while notifications.try_recv().is_ok() {}

    // A becomes fresh again; B and C remain stale (no new sample for them).
    seed_sample(&fixture.metrics, &fixture.metric_a, 0).await;

    fixture.scanner.scan_all_tenants().await.expect("partial restore scan");

    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &machine_dedup).await.unwrap().is_none(),
        "NO_DATA_MACHINE must resolve once at least one metric is fresh again"
    );

    let b_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMetric, &fixture.metric_b);
    let c_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMetric, &fixture.metric_c);
    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &b_dedup).await.unwrap().is_some(),
        "NO_DATA_METRIC(B) should open"
    );
    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &c_dedup).await.unwrap().is_some(),
        "NO_DATA_METRIC(C) should open"
    );

    let a_dedup = monitor_db::repositories::incidents::dedup_key_for(IncidentKind::NoDataMetric, &fixture.metric_a);
    assert!(
        fixture.incidents.find_open_by_dedup_key("tenant1", &a_dedup).await.unwrap().is_none(),
        "A never had its own NO_DATA_METRIC open in this run"
    );

    let machine = fixture.machines.find_by_id(&fixture.machine_id).await.unwrap().unwrap();
    assert_eq!(machine.status, MachineStatus::Stale);

    // Exactly one "partially restored" notification.
    let mut seen = Vec::new();
    while let Ok(request) = notifications.try_recv() {
        seen.push(request);
    }
    let partial_restore = seen.iter().filter(|r| r.resolved && r.title.contains("partially restored")).count();
    assert_eq!(partial_restore, 1);
}
