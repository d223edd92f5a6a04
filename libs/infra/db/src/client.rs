// INICIO DEL ARCHIVO [libs/infra/db/src/client.rs]
//! =================================================================
//! APARATO: DATABASE CONNECTION CLIENT (V1.0)
//! CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
//! RESPONSABILIDAD: GESTIÓN DE ENLACES Y BOOTSTRAP DE ESQUEMA
//!
//! En modo memoria, ancla una conexión viva para que SQLite no purgue
//! el esquema entre conexiones, y aplica el DDL directamente sobre ese
//! ancla. En modo disco/remoto usa una conexión de bootstrap efímera.
//! =================================================================

use crate::errors::DbError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct TursoClient {
    internal_database_driver: Arc<Database>,
    _memory_persistence_anchor: Option<Arc<Connection>>,
}

impl TursoClient {
    #[instrument(skip(database_access_token))]
    pub async fn connect(
        database_connection_url: &str,
        database_access_token: Option<String>,
    ) -> Result<Self, DbError> {
        if database_connection_url.is_empty() {
            return Err(DbError::ConnectionError("DATABASE_URL is not set".into()));
        }

        info!("connecting to database at [{}]", database_connection_url);

        let is_remote = database_connection_url.starts_with("libsql://")
            || database_connection_url.starts_with("https://");

        let is_memory = database_connection_url.contains(":memory:")
            || database_connection_url.contains("mode=memory");

        let database_driver = if is_remote {
            let token = database_access_token.ok_or_else(|| {
                DbError::ConnectionError("remote connection requires TURSO_AUTH_TOKEN".into())
            })?;
            Builder::new_remote(database_connection_url.to_string(), token)
                .build()
                .await
        } else {
            Builder::new_local(database_connection_url).build().await
        }
        .map_err(|e| DbError::ConnectionError(format!("driver initialization failed: {e}")))?;

        let shared_driver = Arc::new(database_driver);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = shared_driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("memory anchor failed: {e}")))?;

            apply_schema(&anchor_conn)
                .await
                .map_err(|e| DbError::ConnectionError(format!("schema bootstrap failed: {e}")))?;

            anchor = Some(Arc::new(anchor_conn));
            info!("in-memory database anchored");
        } else {
            let bootstrap_conn = shared_driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("bootstrap link failed: {e}")))?;
            apply_schema(&bootstrap_conn)
                .await
                .map_err(|e| DbError::ConnectionError(format!("schema bootstrap failed: {e}")))?;
        }

        Ok(Self {
            internal_database_driver: shared_driver,
            _memory_persistence_anchor: anchor,
        })
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.internal_database_driver.connect().map_err(|e| {
            error!("connection allocation failed: {}", e);
            DbError::ConnectionError(e.to_string())
        })
    }
}
// FIN DEL ARCHIVO [libs/infra/db/src/client.rs]
