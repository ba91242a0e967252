use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// True once the travel request table exists. Read-only, unlike `run_pending`.
pub async fn schema_present(pool: &DbPool) -> Result<bool, sqlx::Error> {
    let tables = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'travel_request'",
    )
    .fetch_one(pool)
    .await?;
    Ok(tables == 1)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, schema_present};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "travel_request",
        "travel_request_audit",
        "vendor_message",
        "vendor_chat_message",
        "human_id_sequence",
        "employee",
        "account_capability",
        "idx_travel_request_status",
        "idx_travel_request_originator",
        "idx_employee_manager",
        "idx_account_capability_capability",
        "travel_request_audit_no_update",
        "travel_request_audit_no_delete",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("query sqlite_master")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in [
            "travel_request",
            "travel_request_audit",
            "vendor_message",
            "vendor_chat_message",
            "human_id_sequence",
            "employee",
            "account_capability",
        ] {
            assert_eq!(table_count(&pool, table).await, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn schema_presence_follows_migrations() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert!(!schema_present(&pool).await.expect("inspect"));

        run_pending(&pool).await.expect("run migrations");
        assert!(schema_present(&pool).await.expect("inspect"));
    }

    #[tokio::test]
    async fn audit_rows_cannot_be_rewritten() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO travel_request (
                id, human_id, status, originator_id, originator_name, created_by_id,
                created_by_name, trip_details_json, version, created_at, updated_at
             ) VALUES ('r1', 'TR-2025-0060001', 'pending', 'e@corp.com', 'Esha', 'e@corp.com',
                'Esha', '{}', 1, '2025-03-01T00:00:00Z', '2025-03-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert request");
        sqlx::query(
            "INSERT INTO travel_request_audit
                (request_id, position, sender_id, sender_name, message, created_at)
             VALUES ('r1', 0, 'mgr@corp.com', 'Meera', 'approved', '2025-03-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert audit row");

        let update = sqlx::query("UPDATE travel_request_audit SET message = 'edited'")
            .execute(&pool)
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM travel_request_audit").execute(&pool).await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "travel_request").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index', 'trigger')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
