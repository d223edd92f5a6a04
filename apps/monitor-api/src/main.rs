// [apps/monitor-api/src/main.rs]
//! =================================================================
//! APARATO: MONITOR API MAIN ENTRY POINT (V1.0)
//! CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
//! RESPONSABILIDAD: CARGA DE ENTORNO E IGNICIÓN DEL KERNEL
//! =================================================================

use dotenvy::dotenv;
use monitor_api::prelude::MonitorKernel;
use monitor_engine::Settings;
use monitor_telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing("monitor_api");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let database_token = std::env::var("TURSO_AUTH_TOKEN").ok();
    let bind_port: u16 = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().unwrap_or(3000);

    let settings = Settings::from_env();

    info!(%bind_port, "igniting monitor-api");
    let kernel = MonitorKernel::ignite(&database_url, database_token, settings, bind_port).await;
    kernel.launch().await;
}
