//! `application_templates` operations.

use chrono::Utc;
use sqlx::PgPool;

use engine::ApplicationTemplate;

use crate::models::TemplateRow;
use crate::DbError;

/// Insert or replace the template for its `form_name`.
pub async fn upsert_template(pool: &PgPool, template: &ApplicationTemplate) -> Result<(), DbError> {
    let definition = serde_json::to_value(template).map_err(DbError::document("definition"))?;
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO application_templates (uuid, form_name, definition, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $4)
        ON CONFLICT (form_name)
        DO UPDATE SET uuid = EXCLUDED.uuid, definition = EXCLUDED.definition, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(template.uuid)
    .bind(&template.form_name)
    .bind(definition)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_template(pool: &PgPool, form_name: &str) -> Result<TemplateRow, DbError> {
    sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT uuid, form_name, definition, created_at, updated_at
        FROM application_templates
        WHERE form_name = $1
        "#,
    )
    .bind(form_name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("template", form_name))
}
