use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;

use tripflow_core::domain::{Actor, IdentityId};
use tripflow_core::{Capability, DirectoryEntry, DirectoryError, RoleResolver};

use super::RepositoryError;
use crate::DbPool;

/// Directory backed by the `employee` and `account_capability` tables.
///
/// Every query reads current rows; nothing is cached, so a revoked capability or a changed
/// reporting line applies to the next check.
pub struct SqlRoleResolver {
    pool: DbPool,
}

impl SqlRoleResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, entry: &DirectoryEntry) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO employee (identity, display_name, manager_identity, active)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(identity) DO UPDATE SET
                display_name = excluded.display_name,
                manager_identity = excluded.manager_identity,
                active = excluded.active",
        )
        .bind(entry.identity.as_str())
        .bind(&entry.display_name)
        .bind(entry.manager.as_ref().map(IdentityId::as_str))
        .bind(entry.active)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM account_capability WHERE identity = ?")
            .bind(entry.identity.as_str())
            .execute(&mut *tx)
            .await?;
        let granted_at = Utc::now().to_rfc3339();
        for capability in &entry.capabilities {
            sqlx::query(
                "INSERT INTO account_capability (identity, capability, granted_at)
                 VALUES (?, ?, ?)",
            )
            .bind(entry.identity.as_str())
            .bind(capability.as_str())
            .bind(&granted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn grant(
        &self,
        identity: &IdentityId,
        capability: Capability,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO account_capability (identity, capability, granted_at)
             SELECT identity, ?, ? FROM employee WHERE identity = ?
             ON CONFLICT(identity, capability) DO NOTHING",
        )
        .bind(capability.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(identity.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.find_entry(identity).await?.is_none() {
            return Err(RepositoryError::NotFound(identity.to_string()));
        }
        info!(
            event_name = "directory.capability_granted",
            identity = %identity,
            capability = capability.as_str(),
            "capability granted"
        );
        Ok(())
    }

    pub async fn revoke(
        &self,
        identity: &IdentityId,
        capability: Capability,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM account_capability WHERE identity = ? AND capability = ?")
            .bind(identity.as_str())
            .bind(capability.as_str())
            .execute(&self.pool)
            .await?;
        info!(
            event_name = "directory.capability_revoked",
            identity = %identity,
            capability = capability.as_str(),
            "capability revoked"
        );
        Ok(())
    }

    pub async fn deactivate(&self, identity: &IdentityId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE employee SET active = 0 WHERE identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(identity.to_string()));
        }
        Ok(())
    }

    /// The full record, inactive or not.
    pub async fn find_entry(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<DirectoryEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT identity, display_name, manager_identity, active
             FROM employee
             WHERE identity = ?",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut entry = entry_from_row(&row)?;

        let capabilities: Vec<String> =
            sqlx::query_scalar("SELECT capability FROM account_capability WHERE identity = ?")
                .bind(identity.as_str())
                .fetch_all(&self.pool)
                .await?;
        for raw in capabilities {
            let capability = Capability::parse(&raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown capability `{raw}`"))
            })?;
            entry.capabilities.insert(capability);
        }

        Ok(Some(entry))
    }

    pub async fn list_entries(&self) -> Result<Vec<DirectoryEntry>, RepositoryError> {
        let identities: Vec<String> =
            sqlx::query_scalar("SELECT identity FROM employee ORDER BY identity ASC")
                .fetch_all(&self.pool)
                .await?;

        let mut entries = Vec::with_capacity(identities.len());
        for identity in identities {
            if let Some(entry) = self.find_entry(&IdentityId(identity)).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl RoleResolver for SqlRoleResolver {
    async fn is_manager_of(
        &self,
        identity: &IdentityId,
        employee: &IdentityId,
    ) -> Result<bool, DirectoryError> {
        let matched: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1
                FROM employee AS e
                JOIN employee AS m ON m.identity = e.manager_identity
                WHERE e.identity = ?1 AND m.identity = ?2 AND e.active = 1 AND m.active = 1
             )",
        )
        .bind(employee.as_str())
        .bind(identity.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(matched == 1)
    }

    async fn has_capability(
        &self,
        identity: &IdentityId,
        capability: Capability,
    ) -> Result<bool, DirectoryError> {
        let matched: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1
                FROM account_capability AS c
                JOIN employee AS e ON e.identity = c.identity
                WHERE c.identity = ?1 AND c.capability = ?2 AND e.active = 1
             )",
        )
        .bind(identity.as_str())
        .bind(capability.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(matched == 1)
    }

    async fn lookup(&self, identity: &IdentityId) -> Result<Option<Actor>, DirectoryError> {
        let row = sqlx::query(
            "SELECT identity, display_name FROM employee WHERE identity = ? AND active = 1",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(actor_from_row).transpose()
    }

    async fn manager_of(&self, employee: &IdentityId) -> Result<Option<Actor>, DirectoryError> {
        let row = sqlx::query(
            "SELECT m.identity, m.display_name
             FROM employee AS e
             JOIN employee AS m ON m.identity = e.manager_identity
             WHERE e.identity = ? AND e.active = 1 AND m.active = 1",
        )
        .bind(employee.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(actor_from_row).transpose()
    }

    async fn holders_of(&self, capability: Capability) -> Result<Vec<Actor>, DirectoryError> {
        let rows = sqlx::query(
            "SELECT e.identity, e.display_name
             FROM account_capability AS c
             JOIN employee AS e ON e.identity = c.identity
             WHERE c.capability = ? AND e.active = 1
             ORDER BY e.identity ASC",
        )
        .bind(capability.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(actor_from_row).collect()
    }
}

fn unavailable(error: sqlx::Error) -> DirectoryError {
    DirectoryError::Unavailable(error.to_string())
}

fn actor_from_row(row: &SqliteRow) -> Result<Actor, DirectoryError> {
    Ok(Actor {
        id: IdentityId(row.try_get("identity").map_err(unavailable)?),
        display_name: row.try_get("display_name").map_err(unavailable)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<DirectoryEntry, RepositoryError> {
    Ok(DirectoryEntry {
        identity: IdentityId(row.try_get("identity")?),
        display_name: row.try_get("display_name")?,
        manager: row.try_get::<Option<String>, _>("manager_identity")?.map(IdentityId),
        capabilities: Default::default(),
        active: row.try_get("active")?,
    })
}
