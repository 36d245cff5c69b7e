//! `application_timeline` operations. Rows are only ever inserted.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use engine::TimelineEntry;

use crate::models::TimelineRow;
use crate::DbError;

/// Append an entry. A second creation entry for the same application is
/// silently ignored (see the partial unique index).
pub async fn insert_entry(pool: &PgPool, entry: &TimelineEntry) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO application_timeline
            (uuid, application_uuid, from_status, to_status, actor,
             actions_executed, actions_results, submitted_data, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(entry.uuid)
    .bind(entry.application_uuid)
    .bind(entry.from_status.as_deref())
    .bind(&entry.to_status)
    .bind(entry.actor)
    .bind(Value::from(entry.actions_executed.clone()))
    .bind(Value::Array(entry.actions_results.clone()))
    .bind(Value::Object(entry.submitted_data.clone()))
    .bind(entry.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Entries for one application, oldest first.
pub async fn list_entries(pool: &PgPool, application: Uuid) -> Result<Vec<TimelineRow>, DbError> {
    let rows = sqlx::query_as::<_, TimelineRow>(
        r#"
        SELECT uuid, application_uuid, from_status, to_status, actor,
               actions_executed, actions_results, submitted_data, created_at
        FROM application_timeline
        WHERE application_uuid = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(application)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
