use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use tripflow_core::domain::{
    Actor, Attachment, ChatMessage, HumanId, IdentityId, RequestStatus, StageTimestamps,
    TravelRequest, TravelRequestId, TripDetails, VendorMessage,
};
use tripflow_core::AuditEntry;

use super::{RepositoryError, TravelRequestRepository};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "
    id,
    human_id,
    status,
    originator_id,
    originator_name,
    created_by_id,
    created_by_name,
    trip_details_json,
    manager_approved_at,
    manager_approved_by,
    manager_rejected_at,
    manager_bypassed,
    poc_edited_at,
    poc_approved_at,
    poc_approved_by,
    poc_rejected_at,
    poc_rejection_reason,
    version,
    created_at,
    updated_at";

pub struct SqlTravelRequestRepository {
    pool: DbPool,
}

impl SqlTravelRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TravelRequestRepository for SqlTravelRequestRepository {
    async fn insert(&self, request: &TravelRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO travel_request (
                id,
                human_id,
                status,
                originator_id,
                originator_name,
                created_by_id,
                created_by_name,
                trip_details_json,
                manager_approved_at,
                manager_approved_by,
                manager_rejected_at,
                manager_bypassed,
                poc_edited_at,
                poc_approved_at,
                poc_approved_by,
                poc_rejected_at,
                poc_rejection_reason,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.human_id.0)
        .bind(request.status.as_str())
        .bind(request.originator.id.as_str())
        .bind(&request.originator.display_name)
        .bind(request.created_by.id.as_str())
        .bind(&request.created_by.display_name)
        .bind(encode_trip(&request.trip_details)?)
        .bind(request.stages.manager_approved_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.manager_approved_by.as_ref().map(IdentityId::as_str))
        .bind(request.stages.manager_rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.manager_bypassed)
        .bind(request.stages.poc_edited_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_approved_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_approved_by.as_ref().map(IdentityId::as_str))
        .bind(request.stages.poc_rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_rejection_reason.as_deref())
        .bind(encode_version(request.version)?)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| match error {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Duplicate(request.id.0.clone())
            }
            other => RepositoryError::Database(other),
        })?;

        append_history(&mut tx, request, HistoryCounts::default()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM travel_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?;

        let request = match row {
            Some(row) => Some(hydrate(&mut tx, row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(request)
    }

    async fn find_by_human_id(
        &self,
        human_id: &HumanId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM travel_request WHERE human_id = ?"
        ))
        .bind(&human_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let request = match row {
            Some(row) => Some(hydrate(&mut tx, row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(request)
    }

    async fn update(
        &self,
        mut request: TravelRequest,
        expected_version: u64,
    ) -> Result<TravelRequest, RepositoryError> {
        let next_version = expected_version + 1;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE travel_request SET
                status = ?,
                trip_details_json = ?,
                manager_approved_at = ?,
                manager_approved_by = ?,
                manager_rejected_at = ?,
                manager_bypassed = ?,
                poc_edited_at = ?,
                poc_approved_at = ?,
                poc_approved_by = ?,
                poc_rejected_at = ?,
                poc_rejection_reason = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(encode_trip(&request.trip_details)?)
        .bind(request.stages.manager_approved_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.manager_approved_by.as_ref().map(IdentityId::as_str))
        .bind(request.stages.manager_rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.manager_bypassed)
        .bind(request.stages.poc_edited_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_approved_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_approved_by.as_ref().map(IdentityId::as_str))
        .bind(request.stages.poc_rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.stages.poc_rejection_reason.as_deref())
        .bind(encode_version(next_version)?)
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(encode_version(expected_version)?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM travel_request WHERE id = ?")
                .bind(&request.id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::VersionConflict {
                    request_id: request.id.0.clone(),
                    expected_version,
                }
            } else {
                RepositoryError::NotFound(request.id.0.clone())
            });
        }

        let stored = HistoryCounts::load(&mut tx, &request.id).await?;
        append_history(&mut tx, &request, stored).await?;
        tx.commit().await?;

        request.version = next_version;
        Ok(request)
    }

    async fn next_human_sequence(
        &self,
        year: i32,
        day_of_year: u32,
    ) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO human_id_sequence (year, day_of_year, last_value)
             VALUES (?, ?, 1)
             ON CONFLICT(year, day_of_year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
        )
        .bind(year)
        .bind(i64::from(day_of_year))
        .fetch_one(&self.pool)
        .await?;

        parse_u32("last_value", row.try_get("last_value")?)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS}
             FROM travel_request
             WHERE status = ?
             ORDER BY created_at ASC, human_id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let requests = hydrate_all(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn list_for_originators(
        &self,
        originators: &[IdentityId],
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        if originators.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; originators.len()].join(", ");
        let sql = format!(
            "SELECT {REQUEST_COLUMNS}
             FROM travel_request
             WHERE originator_id IN ({placeholders})
             ORDER BY created_at ASC, human_id ASC"
        );
        let mut query = sqlx::query(&sql);
        for originator in originators {
            query = query.bind(originator.as_str());
        }
        let mut tx = self.pool.begin().await?;
        let rows = query.fetch_all(&mut *tx).await?;

        let requests = hydrate_all(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn audit_trail(&self, id: &TravelRequestId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM travel_request WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(RepositoryError::NotFound(id.0.clone()));
        }

        let rows = sqlx::query(
            "SELECT sender_id, sender_name, message, created_at
             FROM travel_request_audit
             WHERE request_id = ?
             ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(audit_from_row).collect()
    }
}

/// Loads the child collections of one request. Callers pass the same read transaction they
/// fetched the request row with, so row and history come from one snapshot.
async fn hydrate(
    tx: &mut Transaction<'_, Sqlite>,
    row: SqliteRow,
) -> Result<TravelRequest, RepositoryError> {
    let mut request = request_from_row(&row)?;

    let audit_rows = sqlx::query(
        "SELECT sender_id, sender_name, message, created_at
         FROM travel_request_audit
         WHERE request_id = ?
         ORDER BY position ASC",
    )
    .bind(&request.id.0)
    .fetch_all(&mut **tx)
    .await?;
    request.audit_trail = audit_rows.iter().map(audit_from_row).collect::<Result<Vec<_>, _>>()?;

    let vendor_rows = sqlx::query(
        "SELECT vendor_id, vendor_name, message, attachments_json, created_at
         FROM vendor_message
         WHERE request_id = ?
         ORDER BY position ASC",
    )
    .bind(&request.id.0)
    .fetch_all(&mut **tx)
    .await?;
    request.vendor_messages =
        vendor_rows.iter().map(vendor_message_from_row).collect::<Result<Vec<_>, _>>()?;

    let chat_rows = sqlx::query(
        "SELECT sender_id, sender_name, recipient_id, message, created_at
         FROM vendor_chat_message
         WHERE request_id = ?
         ORDER BY position ASC",
    )
    .bind(&request.id.0)
    .fetch_all(&mut **tx)
    .await?;
    request.chat_messages =
        chat_rows.iter().map(chat_message_from_row).collect::<Result<Vec<_>, _>>()?;

    Ok(request)
}

async fn hydrate_all(
    tx: &mut Transaction<'_, Sqlite>,
    rows: Vec<SqliteRow>,
) -> Result<Vec<TravelRequest>, RepositoryError> {
    let mut requests = Vec::with_capacity(rows.len());
    for row in rows {
        requests.push(hydrate(tx, row).await?);
    }
    Ok(requests)
}

/// Rows already stored for each append-only collection of one request.
#[derive(Clone, Copy, Debug, Default)]
struct HistoryCounts {
    audit: usize,
    vendor_messages: usize,
    chat_messages: usize,
}

impl HistoryCounts {
    async fn load(
        tx: &mut Transaction<'_, Sqlite>,
        id: &TravelRequestId,
    ) -> Result<Self, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM travel_request_audit WHERE request_id = ?1) AS audit,
                (SELECT COUNT(*) FROM vendor_message WHERE request_id = ?1) AS vendor_messages,
                (SELECT COUNT(*) FROM vendor_chat_message WHERE request_id = ?1) AS chat_messages",
        )
        .bind(&id.0)
        .fetch_one(&mut **tx)
        .await?;

        Ok(Self {
            audit: parse_count("audit", row.try_get("audit")?)?,
            vendor_messages: parse_count("vendor_messages", row.try_get("vendor_messages")?)?,
            chat_messages: parse_count("chat_messages", row.try_get("chat_messages")?)?,
        })
    }
}

async fn append_history(
    tx: &mut Transaction<'_, Sqlite>,
    request: &TravelRequest,
    stored: HistoryCounts,
) -> Result<(), RepositoryError> {
    let shrinks = request.audit_trail.len() < stored.audit
        || request.vendor_messages.len() < stored.vendor_messages
        || request.chat_messages.len() < stored.chat_messages;
    if shrinks {
        return Err(RepositoryError::HistoryRewrite(request.id.0.clone()));
    }

    for (position, entry) in request.audit_trail.iter().enumerate().skip(stored.audit) {
        sqlx::query(
            "INSERT INTO travel_request_audit
                (request_id, position, sender_id, sender_name, message, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(encode_position(position)?)
        .bind(entry.sender_id.as_str())
        .bind(&entry.sender_name)
        .bind(&entry.message)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    for (position, message) in
        request.vendor_messages.iter().enumerate().skip(stored.vendor_messages)
    {
        let attachments = serde_json::to_string(&message.attachments).map_err(|error| {
            RepositoryError::Decode(format!("could not encode attachments: {error}"))
        })?;
        sqlx::query(
            "INSERT INTO vendor_message
                (request_id, position, vendor_id, vendor_name, message, attachments_json,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(encode_position(position)?)
        .bind(message.vendor_id.as_str())
        .bind(&message.vendor_name)
        .bind(&message.message)
        .bind(attachments)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    for (position, message) in request.chat_messages.iter().enumerate().skip(stored.chat_messages)
    {
        sqlx::query(
            "INSERT INTO vendor_chat_message
                (request_id, position, sender_id, sender_name, recipient_id, message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(encode_position(position)?)
        .bind(message.sender_id.as_str())
        .bind(&message.sender_name)
        .bind(message.recipient_id.as_str())
        .bind(&message.message)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn request_from_row(row: &SqliteRow) -> Result<TravelRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;
    let trip_raw = row.try_get::<String, _>("trip_details_json")?;
    let trip_details = serde_json::from_str::<TripDetails>(&trip_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid trip details: {error}")))?;

    Ok(TravelRequest {
        id: TravelRequestId(row.try_get("id")?),
        human_id: HumanId(row.try_get("human_id")?),
        status,
        originator: Actor {
            id: IdentityId(row.try_get("originator_id")?),
            display_name: row.try_get("originator_name")?,
        },
        created_by: Actor {
            id: IdentityId(row.try_get("created_by_id")?),
            display_name: row.try_get("created_by_name")?,
        },
        trip_details,
        stages: StageTimestamps {
            manager_approved_at: parse_optional_timestamp(
                "manager_approved_at",
                row.try_get("manager_approved_at")?,
            )?,
            manager_approved_by: row
                .try_get::<Option<String>, _>("manager_approved_by")?
                .map(IdentityId),
            manager_rejected_at: parse_optional_timestamp(
                "manager_rejected_at",
                row.try_get("manager_rejected_at")?,
            )?,
            manager_bypassed: row.try_get("manager_bypassed")?,
            poc_edited_at: parse_optional_timestamp(
                "poc_edited_at",
                row.try_get("poc_edited_at")?,
            )?,
            poc_approved_at: parse_optional_timestamp(
                "poc_approved_at",
                row.try_get("poc_approved_at")?,
            )?,
            poc_approved_by: row.try_get::<Option<String>, _>("poc_approved_by")?.map(IdentityId),
            poc_rejected_at: parse_optional_timestamp(
                "poc_rejected_at",
                row.try_get("poc_rejected_at")?,
            )?,
            poc_rejection_reason: row.try_get("poc_rejection_reason")?,
        },
        audit_trail: Vec::new(),
        vendor_messages: Vec::new(),
        chat_messages: Vec::new(),
        version: parse_version(row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEntry, RepositoryError> {
    Ok(AuditEntry {
        sender_id: IdentityId(row.try_get("sender_id")?),
        sender_name: row.try_get("sender_name")?,
        message: row.try_get("message")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn vendor_message_from_row(row: &SqliteRow) -> Result<VendorMessage, RepositoryError> {
    let attachments_raw = row.try_get::<String, _>("attachments_json")?;
    let attachments = serde_json::from_str::<Vec<Attachment>>(&attachments_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid attachments: {error}")))?;

    Ok(VendorMessage {
        vendor_id: IdentityId(row.try_get("vendor_id")?),
        vendor_name: row.try_get("vendor_name")?,
        message: row.try_get("message")?,
        attachments,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn chat_message_from_row(row: &SqliteRow) -> Result<ChatMessage, RepositoryError> {
    Ok(ChatMessage {
        sender_id: IdentityId(row.try_get("sender_id")?),
        sender_name: row.try_get("sender_name")?,
        recipient_id: IdentityId(row.try_get("recipient_id")?),
        message: row.try_get("message")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn encode_trip(trip: &TripDetails) -> Result<String, RepositoryError> {
    serde_json::to_string(trip)
        .map_err(|error| RepositoryError::Decode(format!("could not encode trip details: {error}")))
}

fn encode_version(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("version {version} exceeds storage range")))
}

fn encode_position(position: usize) -> Result<i64, RepositoryError> {
    i64::try_from(position)
        .map_err(|_| RepositoryError::Decode(format!("position {position} exceeds storage range")))
}

fn parse_version(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `version` (expected positive): {value}"))
    })
}

fn parse_count(column: &str, value: i64) -> Result<usize, RepositoryError> {
    usize::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected count): {value}"))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
