//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models. Conversions into the engine's domain
//! types decode the JSONB columns and fail with [`DbError::Document`] when a
//! stored document no longer matches the model.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use engine::{ApplicationInstance, ApplicationTemplate, TimelineEntry};

use crate::DbError;

// ---------------------------------------------------------------------------
// application_templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub uuid: Uuid,
    pub form_name: String,
    /// The full camelCase template document.
    pub definition: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for ApplicationTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let mut template: ApplicationTemplate =
            serde_json::from_value(row.definition).map_err(DbError::document("definition"))?;
        template.uuid = row.uuid;
        template.form_name = row.form_name;
        Ok(template)
    }
}

// ---------------------------------------------------------------------------
// applications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub uuid: Uuid,
    pub form_name: String,
    pub status: String,
    pub form_data: Value,
    /// Template snapshot taken at submission.
    pub template: Value,
    pub submitted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for ApplicationInstance {
    type Error = DbError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            uuid: row.uuid,
            form_name: row.form_name,
            status: row.status,
            form_data: serde_json::from_value(row.form_data).map_err(DbError::document("form_data"))?,
            template: serde_json::from_value(row.template).map_err(DbError::document("template"))?,
            submitted_by: row.submitted_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// application_timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct TimelineRow {
    pub uuid: Uuid,
    pub application_uuid: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor: Option<Uuid>,
    pub actions_executed: Value,
    pub actions_results: Value,
    pub submitted_data: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TimelineRow> for TimelineEntry {
    type Error = DbError;

    fn try_from(row: TimelineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            uuid: row.uuid,
            application_uuid: row.application_uuid,
            from_status: row.from_status,
            to_status: row.to_status,
            actor: row.actor,
            actions_executed: serde_json::from_value(row.actions_executed)
                .map_err(DbError::document("actions_executed"))?,
            actions_results: serde_json::from_value(row.actions_results)
                .map_err(DbError::document("actions_results"))?,
            submitted_data: serde_json::from_value(row.submitted_data)
                .map_err(DbError::document("submitted_data"))?,
            created_at: row.created_at,
        })
    }
}
