// [libs/shared/telemetry/src/lib.rs]
//! =================================================================
//! APARATO: TELEMETRY INITIALIZER (V1.0)
//! CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4/L6)
//! RESPONSABILIDAD: GESTIÓN DE TRAZADO ESTRUCTURADO Y CAPTURA DE PÁNICOS
//! =================================================================

use std::panic;
use tracing::{error, info, instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Inicializa el suscriptor de trazas global y el hook de pánico.
///
/// En desarrollo emite logs compactos y coloreados; en producción emite
/// JSON plano apto para un agregador de logs externo.
///
/// # Panics
/// Entra en pánico si ya existe un suscriptor global instalado.
#[instrument(skip_all)]
pub fn init_tracing(service_name: &str) {
    let environmental_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={level},tower_http=warn,hyper=warn,libsql=error",
            service_name,
            level = if cfg!(debug_assertions) { "debug" } else { "info" }
        )
        .into()
    });

    let is_production = !cfg!(debug_assertions);

    if is_production {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    }

    let service_id = service_name.to_string();
    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");

        error!(
            target: "panic_monitor",
            service = %service_id,
            location = %location,
            "thread panicked: {}",
            payload
        );
    }));

    info!("telemetry initialized for [{}]", service_name);
}
