// [libs/infra/db/src/repositories/idempotency.rs]
//! Deduplicación de peticiones de ingesta por `Idempotency-Key`.

use crate::errors::DbError;
use crate::TursoClient;
use libsql::params;
use tracing::instrument;

#[derive(Clone)]
pub struct IdempotencyRepository {
    database_client: TursoClient,
}

impl IdempotencyRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Intenta reservar la clave. Devuelve `true` si esta llamada fue la
    /// primera en verla (debe procesarse); `false` si ya existía (la
    /// petición es un duplicado y debe devolverse sin reprocesar).
    #[instrument(skip(self))]
    pub async fn try_reserve(&self, tenant_id: &str, idempotency_key: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute(
                "INSERT INTO idempotency_keys (tenant_id, idempotency_key) VALUES (?1, ?2)
                 ON CONFLICT(tenant_id, idempotency_key) DO NOTHING",
                params![tenant_id, idempotency_key],
            )
            .await?;
        Ok(affected > 0)
    }
}
