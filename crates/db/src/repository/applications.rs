//! `applications` operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use engine::ApplicationInstance;

use crate::models::ApplicationRow;
use crate::DbError;

pub async fn insert_application(pool: &PgPool, application: &ApplicationInstance) -> Result<(), DbError> {
    let template = serde_json::to_value(&application.template).map_err(DbError::document("template"))?;

    sqlx::query(
        r#"
        INSERT INTO applications
            (uuid, form_name, status, form_data, template, submitted_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(application.uuid)
    .bind(&application.form_name)
    .bind(&application.status)
    .bind(serde_json::Value::Object(application.form_data.clone()))
    .bind(template)
    .bind(application.submitted_by)
    .bind(application.created_at)
    .bind(application.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_application(pool: &PgPool, uuid: Uuid) -> Result<ApplicationRow, DbError> {
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        SELECT uuid, form_name, status, form_data, template, submitted_by, created_at, updated_at
        FROM applications
        WHERE uuid = $1
        "#,
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("application", uuid))
}

/// Set `status` on every listed application in one statement.
pub async fn update_status(pool: &PgPool, uuids: &[Uuid], status: &str) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE applications
        SET status = $1, updated_at = $2
        WHERE uuid = ANY($3)
        "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(uuids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
