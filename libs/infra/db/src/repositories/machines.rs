// [libs/infra/db/src/repositories/machines.rs]
//! Máquinas monitoreadas de un tenant.

use crate::errors::DbError;
use crate::util::parse_ts;
use crate::TursoClient;
use libsql::{params, Row};
use monitor_domain::machine::{Machine, MachineStatus};
use tracing::instrument;

fn status_to_str(status: MachineStatus) -> &'static str {
    match status {
        MachineStatus::Up => "up",
        MachineStatus::Stale => "stale",
        MachineStatus::Down => "down",
        MachineStatus::NoData => "no_data",
    }
}

fn status_from_str(raw: &str) -> Result<MachineStatus, DbError> {
    Ok(match raw {
        "up" => MachineStatus::Up,
        "stale" => MachineStatus::Stale,
        "down" => MachineStatus::Down,
        "no_data" => MachineStatus::NoData,
        other => return Err(DbError::MappingError(format!("unknown machine status '{other}'"))),
    })
}

fn row_to_machine(row: &Row) -> Result<Machine, DbError> {
    Ok(Machine {
        id: row.get::<String>(0)?,
        tenant_id: row.get::<String>(1)?,
        name: row.get::<String>(2)?,
        status: status_from_str(&row.get::<String>(3)?)?,
        created_at: parse_ts(row.get::<String>(4)?)?,
        updated_at: parse_ts(row.get::<String>(5)?)?,
    })
}

const SELECT_COLUMNS: &str = "id, tenant_id, name, status, created_at, updated_at";

#[derive(Clone)]
pub struct MachineRepository {
    database_client: TursoClient,
}

impl MachineRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Crea la máquina si no existe (descubierta por el nombre que reporta
    /// el payload de ingesta) y devuelve su id.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, tenant_id: &str, name: &str) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(
                "SELECT id FROM machines WHERE tenant_id = ?1 AND name = ?2",
                params![tenant_id, name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            return Ok(row.get::<String>(0)?);
        }

        let id = uuid::Uuid::new_v4().to_string();
        connection
            .execute(
                "INSERT INTO machines (id, tenant_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id, name) DO NOTHING",
                params![id.clone(), tenant_id, name],
            )
            .await?;

        // Otro request concurrente pudo haber ganado la inserción.
        let mut rows = connection
            .query(
                "SELECT id FROM machines WHERE tenant_id = ?1 AND name = ?2",
                params![tenant_id, name],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DbError::MappingError("machine vanished after insert".into()))?;
        Ok(row.get::<String>(0)?)
    }

    #[instrument(skip(self))]
    pub async fn touch(&self, machine_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE machines SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![machine_id],
            )
            .await?;
        Ok(())
    }

    /// Fija el `status` derivado por el escáner de frescura. Es una
    /// proyección de conveniencia para lectura: la fuente de verdad de
    /// "¿hay un NO_DATA_MACHINE abierto?" sigue siendo el incidente.
    #[instrument(skip(self))]
    pub async fn set_status(&self, machine_id: &str, status: MachineStatus) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE machines SET status = ?2 WHERE id = ?1",
                params![machine_id, status_to_str(status)],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, machine_id: &str) -> Result<Option<Machine>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM machines WHERE id = ?1"),
                params![machine_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_machine(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Machine>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM machines WHERE tenant_id = ?1"),
                params![tenant_id],
            )
            .await?;

        let mut machines = Vec::new();
        while let Some(row) = rows.next().await? {
            machines.push(row_to_machine(&row)?);
        }
        Ok(machines)
    }
}
