// [apps/monitor-api/src/kernel.rs]
//! =================================================================
//! APARATO: MONITOR KERNEL (V1.0)
//! CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
//! RESPONSABILIDAD: IGNICIÓN DE INFRAESTRUCTURA Y ARRANQUE DE DAEMONS
//!
//! Conecta la base de datos, construye el estado compartido, levanta
//! los cuatro bucles de fondo del motor (escáner de frescura, sondeo
//! HTTP, relevo del outbox, consumidor de la cola `notify`) y por
//! último sirve el router HTTP. Cada daemon escucha además el canal de
//! apagado para terminar limpiamente cuando se recibe la señal.
//! =================================================================

use crate::routes::build_router;
use crate::state::AppState;
use monitor_db::TursoClient;
use monitor_engine::services::NotificationReceiver;
use monitor_engine::Settings;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

pub struct MonitorKernel {
    pub bind_port: u16,
    pub state: AppState,
    notification_receiver: NotificationReceiver,
}

impl MonitorKernel {
    #[instrument(skip(database_token))]
    pub async fn ignite(database_url: &str, database_token: Option<String>, settings: Settings, bind_port: u16) -> Self {
        let database_client = TursoClient::connect(database_url, database_token)
            .await
            .expect("database connection failed; refusing to start without persistence");

        let (state, notification_receiver) = AppState::new(database_client, settings);

        Self { bind_port, state, notification_receiver }
    }

    pub async fn launch(self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        spawn_freshness_scanner(self.state.clone(), shutdown_rx.clone());
        spawn_http_probe_runner(self.state.clone(), shutdown_rx.clone());
        spawn_outbox_relay(self.state.clone(), shutdown_rx.clone());
        spawn_notification_consumer(self.state.clone(), self.notification_receiver, shutdown_rx.clone());

        let router = build_router(self.state);
        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.bind_port);

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .unwrap_or_else(|e| panic!("failed to bind {bind_address}: {e}"));

        info!(%bind_address, "monitor-api listening");

        let serve_result = axum::serve(listener, router)
            .with_graceful_shutdown(wait_for_shutdown_signal())
            .await;

        let _ = shutdown_tx.send(true);

        if let Err(e) = serve_result {
            error!(error = %e, "http server exited with error");
            std::process::exit(1);
        }
    }
}

async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn spawn_freshness_scanner(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = state.settings.freshness_scan_interval;
    tokio::spawn(async move {
        let scanner = state.freshness_scanner();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = scanner.scan_all_tenants().await {
                        warn!(error = %e, "freshness scan pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("freshness scanner shutting down");
                    break;
                }
            }
        }
    });
}

fn spawn_http_probe_runner(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = state.settings.http_probe_default_interval;
    tokio::spawn(async move {
        let runner = state.http_probe_runner();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = runner.run_once().await {
                        warn!(error = %e, "http probe pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("http probe runner shutting down");
                    break;
                }
            }
        }
    });
}

fn spawn_outbox_relay(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = state.settings.outbox_relay_interval;
    tokio::spawn(async move {
        let relay = state.outbox_relay();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = relay.run_once(50).await {
                        warn!(error = %e, "outbox relay pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("outbox relay shutting down");
                    break;
                }
            }
        }
    });
}

/// Único consumidor de la cola `notify`: drena el canal en el que los
/// detectores (evaluador, escáner, sondeo) encolan sus peticiones y las
/// despacha una a una. Si el canal se cierra (todos los remitentes
/// soltados), el daemon termina — eso nunca ocurre en producción porque
/// `AppState` siempre retiene un `NotificationSender`.
fn spawn_notification_consumer(state: AppState, mut receiver: NotificationReceiver, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let dispatcher = state.notification_dispatcher();
        loop {
            tokio::select! {
                maybe_request = receiver.recv() => {
                    match maybe_request {
                        Some(request) => {
                            if let Err(e) = dispatcher.dispatch(&request).await {
                                warn!(error = %e, "notification dispatch failed");
                            }
                        }
                        None => {
                            warn!("notification channel closed, consumer exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("notification consumer shutting down");
                    break;
                }
            }
        }
    });
}
